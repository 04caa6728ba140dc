//! Monitor - wires a provider account to the session manager
//!
//! `begin` performs the "begin monitoring" sequence: validate config, hook
//! credential rotation, enumerate locations and cameras, then subscribe.
//! Provider problems are shown on the display and leave the monitor idle
//! instead of failing the process.

use crate::{
    config::{MonitorConfig, SessionSettings},
    credentials::CredentialStore,
    notify::{DisplaySink, NotificationGateway},
    provider::{Camera, CameraProvider, Location},
    session::SessionManager,
    subscriber::EventSubscriber,
    Error, Result,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Running monitor for one account
pub struct Monitor {
    manager: Arc<SessionManager>,
    gateway: Arc<NotificationGateway>,
    subscriber: EventSubscriber,
    cancel: CancellationToken,
    background: Vec<JoinHandle<()>>,
    cameras: usize,
    stopped: bool,
}

impl Monitor {
    /// Start monitoring `provider`.
    ///
    /// Configuration errors are returned; provider errors are reported to
    /// the display and yield a monitor with no subscriptions.
    pub async fn begin(
        config: &MonitorConfig,
        settings: SessionSettings,
        credentials: CredentialStore,
        provider: Arc<dyn CameraProvider>,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<Self> {
        config.validate()?;

        let gateway = Arc::new(NotificationGateway::new(sink));
        let manager = SessionManager::new(settings, Arc::clone(&gateway));
        let cancel = CancellationToken::new();

        let mut monitor = Self {
            manager,
            gateway,
            subscriber: EventSubscriber::new(),
            cancel,
            background: Vec::new(),
            cameras: 0,
            stopped: false,
        };

        let rotation = monitor.spawn_rotation(&provider, credentials);
        monitor.background.push(rotation);

        match monitor.discover(provider.as_ref()).await {
            Ok((locations, cameras)) => {
                for location in &locations {
                    let connection = monitor.spawn_connection_log(location);
                    monitor.background.push(connection);
                }

                if cameras.is_empty() {
                    warn!("No cameras were found! Ensure you have a camera on your account or that you provided accurate login information in the config. A restart is required.");
                    monitor.gateway.error(Error::NoCameras.to_string());
                    return Ok(monitor);
                }

                monitor.cameras = cameras.len();
                monitor
                    .subscriber
                    .subscribe(&monitor.manager, &cameras, config.ring_stream_motion);
            }
            Err(e) => {
                warn!(code = e.error_code(), error = %e, "Provider unavailable, monitoring not started");
                monitor.gateway.error(e.to_string());
            }
        }

        Ok(monitor)
    }

    /// Session manager driving this monitor
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// True when at least one camera is subscribed
    pub fn is_monitoring(&self) -> bool {
        !self.subscriber.is_empty()
    }

    /// Number of subscribed cameras
    pub fn camera_count(&self) -> usize {
        self.cameras
    }

    /// Enumerate and log the account's locations, cameras and devices
    async fn discover(
        &self,
        provider: &dyn CameraProvider,
    ) -> Result<(Vec<Arc<dyn Location>>, Vec<Arc<dyn Camera>>)> {
        let locations = provider.locations().await?;
        let cameras = provider.cameras().await?;

        info!(
            "Found {} location(s) with {} camera(s).",
            locations.len(),
            cameras.len()
        );

        for location in &locations {
            let location_cameras = location.cameras();
            info!(
                "Location {} has the following {} camera(s):",
                location.name(),
                location_cameras.len()
            );
            for camera in &location_cameras {
                info!("- {}", camera.info());
            }

            match location.devices().await {
                Ok(devices) => {
                    info!(
                        "Location {} has the following {} device(s):",
                        location.name(),
                        devices.len()
                    );
                    for device in &devices {
                        info!("- {}: {} ({})", device.zid, device.name, device.device_type);
                    }
                }
                Err(e) => warn!(location = location.name(), error = %e, "Could not list devices"),
            }
        }

        Ok((locations, cameras))
    }

    /// Persist every credential rotation, one at a time
    fn spawn_rotation(&self, provider: &Arc<dyn CameraProvider>, credentials: CredentialStore) -> JoinHandle<()> {
        let mut rotations = provider.token_rotations();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                let rotation = tokio::select! {
                    _ = cancel.cancelled() => break,
                    rotation = rotations.recv() => rotation,
                };

                match rotation {
                    Ok(rotation) => {
                        if let Err(e) = credentials.rotate(rotation).await {
                            warn!(path = %credentials.path().display(), error = %e, "Failed to persist rotated credential");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Credential rotations dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Log connect/disconnect transitions, skipping the initial state
    fn spawn_connection_log(&self, location: &Arc<dyn Location>) -> JoinHandle<()> {
        let mut status = location.connection_status();
        let cancel = self.cancel.clone();
        let name = location.name().to_string();
        let id = location.id().to_string();

        tokio::spawn(async move {
            let _ = status.borrow_and_update();
            loop {
                let changed = tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = status.changed() => changed,
                };
                if changed.is_err() {
                    break;
                }

                let connected = *status.borrow_and_update();
                let state = if connected { "Connected to" } else { "Disconnected from" };
                info!("**** {} location {} - {}", state, name, id);
            }
        })
    }

    /// Stop subscriptions, the active session and background tasks. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        info!("Stopping monitor");
        self.cancel.cancel();
        self.subscriber.shutdown().await;
        for task in self.background.drain(..) {
            let _ = task.await;
        }
        self.manager.shutdown().await;
    }
}
