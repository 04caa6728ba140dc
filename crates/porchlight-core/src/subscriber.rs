//! Event subscriber
//!
//! Binds each camera's doorbell stream (and motion stream when enabled) to
//! the session manager. Every qualifying event is offered as its own task so
//! a trigger is judged when it arrives and is never queued behind a start.
//! Offered triggers are tracked so shutdown can wait for in-flight starts.

use crate::{
    provider::Camera,
    session::SessionManager,
    TriggerKind,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Owns the per-camera subscription tasks
pub struct EventSubscriber {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    offers: TaskTracker,
}

impl EventSubscriber {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            offers: TaskTracker::new(),
        }
    }

    /// Subscribe to every camera; motion only when `motion` is set
    pub fn subscribe(&mut self, manager: &Arc<SessionManager>, cameras: &[Arc<dyn Camera>], motion: bool) {
        for camera in cameras {
            self.tasks.push(self.spawn_doorbell(manager, camera));
            info!(camera = %camera.info().name, "Actively listening for doorbell presses");

            if motion {
                self.tasks.push(self.spawn_motion(manager, camera));
                info!(camera = %camera.info().name, "Actively listening for motion events");
            }
        }
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Close every subscription, then wait for triggers already offered
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Subscription task failed");
                }
            }
        }

        self.offers.close();
        self.offers.wait().await;
    }

    fn spawn_doorbell(&self, manager: &Arc<SessionManager>, camera: &Arc<dyn Camera>) -> JoinHandle<()> {
        let mut presses = camera.doorbell_presses();
        let cancel = self.cancel.clone();
        let offers = self.offers.clone();
        let manager = Arc::clone(manager);
        let camera = Arc::clone(camera);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = presses.recv() => event,
                };

                match event {
                    Ok(press) => {
                        debug!(camera = %camera.info().name, at = %press.at, "Doorbell pressed");
                        offer(&offers, &manager, &camera, TriggerKind::Doorbell);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(camera = %camera.info().name, skipped, "Doorbell events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(camera = %camera.info().name, "Doorbell subscription closed");
        })
    }

    fn spawn_motion(&self, manager: &Arc<SessionManager>, camera: &Arc<dyn Camera>) -> JoinHandle<()> {
        let mut motions = camera.motion_events();
        let cancel = self.cancel.clone();
        let offers = self.offers.clone();
        let manager = Arc::clone(manager);
        let camera = Arc::clone(camera);

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = motions.recv() => event,
                };

                match event {
                    Ok(motion) if motion.is_new => {
                        debug!(camera = %camera.info().name, at = %motion.at, "New motion");
                        offer(&offers, &manager, &camera, TriggerKind::Motion);
                    }
                    Ok(_) => {
                        debug!(camera = %camera.info().name, "Motion already signaled, skipping");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(camera = %camera.info().name, skipped, "Motion events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(camera = %camera.info().name, "Motion subscription closed");
        })
    }
}

impl Default for EventSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

fn offer(offers: &TaskTracker, manager: &Arc<SessionManager>, camera: &Arc<dyn Camera>, trigger: TriggerKind) {
    let manager = Arc::clone(manager);
    let camera = Arc::clone(camera);
    offers.spawn(async move {
        manager.on_trigger(camera, trigger).await;
    });
}
