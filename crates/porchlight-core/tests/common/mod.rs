//! In-memory provider, cameras and calls for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use porchlight_core::{
    CallControl, Camera, CameraInfo, CameraProvider, DeviceInfo, DoorbellPress, Error,
    HlsOutputArgs, LiveCall, Location, MotionEvent, Notification, Result, SessionPhase,
    SessionSettings, TokenRotation,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

pub const WAIT: Duration = Duration::from_secs(3);

/// Settings tuned for fast tests
pub fn settings(base: &Path, max_duration: Duration) -> SessionSettings {
    SessionSettings {
        ready_window: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        ..SessionSettings::new(base, max_duration)
    }
}

// =============================================================================
// Calls
// =============================================================================

/// A running call the test can stop or end
pub struct FakeCall {
    stops: AtomicUsize,
    end_on_stop: bool,
    ended: Mutex<Option<oneshot::Sender<()>>>,
}

impl FakeCall {
    fn new(end_on_stop: bool) -> (Arc<Self>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let call = Arc::new(Self {
            stops: AtomicUsize::new(0),
            end_on_stop,
            ended: Mutex::new(Some(tx)),
        });
        (call, rx)
    }

    /// Simulate the backend exiting on its own
    pub fn finish(&self) {
        if let Some(tx) = self.ended.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl CallControl for FakeCall {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.end_on_stop {
            self.finish();
        }
    }
}

// =============================================================================
// Cameras
// =============================================================================

pub struct FakeCamera {
    info: CameraInfo,
    presses: broadcast::Sender<DoorbellPress>,
    motions: broadcast::Sender<MotionEvent>,
    motion_subscriptions: AtomicUsize,
    starts: AtomicUsize,
    failing: AtomicBool,
    /// Write the manifest after this delay; `None` never writes it
    manifest_delay: Option<Duration>,
    /// Write the manifest inside `stream_video`, then hold the call this long
    ready_before_return: Option<Duration>,
    end_on_stop: bool,
    calls: Mutex<Vec<Arc<FakeCall>>>,
}

impl FakeCamera {
    pub fn new(id: &str, name: &str) -> Self {
        let (presses, _) = broadcast::channel(16);
        let (motions, _) = broadcast::channel(16);
        Self {
            info: CameraInfo::new(id, name, "doorbell_v4"),
            presses,
            motions,
            motion_subscriptions: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            manifest_delay: Some(Duration::from_millis(30)),
            ready_before_return: None,
            end_on_stop: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn without_manifest(mut self) -> Self {
        self.manifest_delay = None;
        self
    }

    /// The manifest is written before `stream_video` returns, which then
    /// takes `hold` to complete
    pub fn ready_before_return(mut self, hold: Duration) -> Self {
        self.manifest_delay = None;
        self.ready_before_return = Some(hold);
        self
    }

    /// Calls ignore `stop` and only end through [`FakeCall::finish`]
    pub fn ending_manually(mut self) -> Self {
        self.end_on_stop = false;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn ring(&self) {
        let _ = self.presses.send(DoorbellPress::now());
    }

    pub fn motion(&self, is_new: bool) {
        let _ = self.motions.send(MotionEvent::new(is_new));
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn motion_subscriptions(&self) -> usize {
        self.motion_subscriptions.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<Arc<FakeCall>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Camera for FakeCamera {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn doorbell_presses(&self) -> broadcast::Receiver<DoorbellPress> {
        self.presses.subscribe()
    }

    fn motion_events(&self) -> broadcast::Receiver<MotionEvent> {
        self.motion_subscriptions.fetch_add(1, Ordering::SeqCst);
        self.motions.subscribe()
    }

    async fn stream_video(&self, output: HlsOutputArgs) -> Result<LiveCall> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Provider("camera offline".to_string()));
        }

        if let Some(hold) = self.ready_before_return {
            tokio::fs::write(output.output(), PLAYLIST).await?;
            tokio::time::sleep(hold).await;
        }

        if let Some(delay) = self.manifest_delay {
            let manifest = output.output().to_path_buf();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tokio::fs::write(&manifest, PLAYLIST).await;
            });
        }

        let (call, ended) = FakeCall::new(self.end_on_stop);
        self.calls.lock().unwrap().push(Arc::clone(&call));
        Ok(LiveCall::new(call, ended))
    }
}

pub const PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:2
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:2.000000,
stream0.ts
";

// =============================================================================
// Locations and provider
// =============================================================================

pub struct FakeLocation {
    id: String,
    name: String,
    cameras: Vec<Arc<dyn Camera>>,
    status: watch::Sender<bool>,
}

impl FakeLocation {
    pub fn new(id: &str, name: &str, cameras: Vec<Arc<dyn Camera>>) -> Self {
        let (status, _) = watch::channel(true);
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cameras,
            status,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.status.send_replace(connected);
    }
}

#[async_trait]
impl Location for FakeLocation {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cameras(&self) -> Vec<Arc<dyn Camera>> {
        self.cameras.clone()
    }

    async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            zid: "zid-1".to_string(),
            name: "Front Chime".to_string(),
            device_type: "chime".to_string(),
        }])
    }

    fn connection_status(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

pub struct FakeProvider {
    locations: Vec<Arc<dyn Location>>,
    rotations: broadcast::Sender<TokenRotation>,
    unavailable: bool,
}

impl FakeProvider {
    /// One location holding every camera
    pub fn with_cameras(cameras: Vec<Arc<dyn Camera>>) -> Self {
        let location: Arc<dyn Location> = Arc::new(FakeLocation::new("loc-1", "Home", cameras));
        let (rotations, _) = broadcast::channel(8);
        Self {
            locations: vec![location],
            rotations,
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        let mut provider = Self::with_cameras(Vec::new());
        provider.unavailable = true;
        provider
    }

    pub fn rotate(&self, old: Option<&str>, new: &str) {
        let _ = self.rotations.send(TokenRotation {
            old: old.map(str::to_string),
            new: new.to_string(),
        });
    }
}

#[async_trait]
impl CameraProvider for FakeProvider {
    async fn locations(&self) -> Result<Vec<Arc<dyn Location>>> {
        if self.unavailable {
            return Err(Error::Authentication("refresh token rejected".to_string()));
        }
        Ok(self.locations.clone())
    }

    async fn cameras(&self) -> Result<Vec<Arc<dyn Camera>>> {
        if self.unavailable {
            return Err(Error::Authentication("refresh token rejected".to_string()));
        }
        Ok(self.locations.iter().flat_map(|l| l.cameras()).collect())
    }

    fn token_rotations(&self) -> broadcast::Receiver<TokenRotation> {
        self.rotations.subscribe()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Next notification, failing the test after [`WAIT`]
pub async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed")
}

/// Assert nothing arrives for `quiet`
pub async fn assert_no_notification(rx: &mut mpsc::UnboundedReceiver<Notification>, quiet: Duration) {
    if let Ok(Some(notification)) = tokio::time::timeout(quiet, rx.recv()).await {
        panic!("unexpected notification: {:?}", notification);
    }
}

/// Wait until the phase channel reports `phase`
pub async fn wait_for_phase(rx: &mut watch::Receiver<SessionPhase>, phase: SessionPhase) {
    tokio::time::timeout(WAIT, async {
        while *rx.borrow_and_update() != phase {
            if rx.changed().await.is_err() {
                panic!("phase channel closed");
            }
        }
    })
    .await
    .expect("timed out waiting for phase");
}
