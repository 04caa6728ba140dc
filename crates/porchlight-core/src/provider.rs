//! Camera provider seam
//!
//! The account provider, its locations and cameras, and the running call a
//! camera hands back once streaming starts.

use crate::encoding::HlsOutputArgs;
use crate::{CameraInfo, DeviceInfo, DoorbellPress, MotionEvent, Result, TokenRotation};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};

/// Stop handle for a running stream
pub trait CallControl: Send + Sync {
    /// Ask the backend to stop. Calling it more than once is harmless.
    fn stop(&self);
}

/// A stream started by [`Camera::stream_video`]
pub struct LiveCall {
    control: Arc<dyn CallControl>,
    ended: oneshot::Receiver<()>,
}

impl LiveCall {
    /// `ended` resolves (or is dropped) when the call is over
    pub fn new(control: Arc<dyn CallControl>, ended: oneshot::Receiver<()>) -> Self {
        Self { control, ended }
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn into_parts(self) -> (Arc<dyn CallControl>, oneshot::Receiver<()>) {
        (self.control, self.ended)
    }
}

impl std::fmt::Debug for LiveCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCall").finish_non_exhaustive()
    }
}

/// A camera that can ring, see motion and stream
#[async_trait]
pub trait Camera: Send + Sync {
    fn info(&self) -> &CameraInfo;

    /// Doorbell presses from now on
    fn doorbell_presses(&self) -> broadcast::Receiver<DoorbellPress>;

    /// Motion notifications from now on
    fn motion_events(&self) -> broadcast::Receiver<MotionEvent>;

    /// Start the backend writing HLS output described by `output`
    async fn stream_video(&self, output: HlsOutputArgs) -> Result<LiveCall>;
}

/// A location on the account
#[async_trait]
pub trait Location: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn cameras(&self) -> Vec<Arc<dyn Camera>>;

    async fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Connection state; the current value is the initial state
    fn connection_status(&self) -> watch::Receiver<bool>;
}

/// The account provider
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn locations(&self) -> Result<Vec<Arc<dyn Location>>>;

    async fn cameras(&self) -> Result<Vec<Arc<dyn Camera>>>;

    /// Credential rotations from now on
    fn token_rotations(&self) -> broadcast::Receiver<TokenRotation>;
}
