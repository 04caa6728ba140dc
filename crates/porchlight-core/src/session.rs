//! Session Manager - owns the single live streaming session
//!
//! Coordinates:
//! - Trigger admission (one session at a time, extra triggers dropped)
//! - Output directory reset before every start
//! - Readiness watch armed before the backend starts
//! - Deadline enforcement and the shared teardown path

use crate::{
    config::SessionSettings,
    encoding::HlsOutputArgs,
    janitor,
    notify::NotificationGateway,
    playlist,
    provider::{CallControl, Camera},
    watcher::StreamReadyWatcher,
    CameraInfo, Error, Result, SessionId, SessionPhase, TriggerKind,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Result of offering a trigger to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new session was started
    Started(SessionId),
    /// Another session was starting or running
    Ignored,
    /// The start failed and was reported to the display
    Failed,
}

/// Read-only view of the current session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub camera: CameraInfo,
    pub trigger: TriggerKind,
    pub phase: SessionPhase,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
}

struct ActiveSession {
    id: SessionId,
    camera: CameraInfo,
    trigger: TriggerKind,
    started_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    call: Arc<dyn CallControl>,
    deadline_task: JoinHandle<()>,
}

enum Slot {
    Idle,
    Starting {
        id: SessionId,
        camera: CameraInfo,
        trigger: TriggerKind,
        started_at: DateTime<Utc>,
    },
    Active(ActiveSession),
    Stopping(ActiveSession),
}

impl Slot {
    fn phase(&self) -> SessionPhase {
        match self {
            Slot::Idle => SessionPhase::Idle,
            Slot::Starting { .. } => SessionPhase::Starting,
            Slot::Active(_) => SessionPhase::Active,
            Slot::Stopping(_) => SessionPhase::Stopping,
        }
    }

    fn id(&self) -> Option<SessionId> {
        match self {
            Slot::Idle => None,
            Slot::Starting { id, .. } => Some(*id),
            Slot::Active(session) | Slot::Stopping(session) => Some(session.id),
        }
    }

    fn snapshot(&self) -> Option<SessionSnapshot> {
        let phase = self.phase();
        match self {
            Slot::Idle => None,
            Slot::Starting {
                id,
                camera,
                trigger,
                started_at,
            } => Some(SessionSnapshot {
                id: *id,
                camera: camera.clone(),
                trigger: *trigger,
                phase,
                started_at: *started_at,
                deadline: None,
            }),
            Slot::Active(session) | Slot::Stopping(session) => Some(SessionSnapshot {
                id: session.id,
                camera: session.camera.clone(),
                trigger: session.trigger,
                phase,
                started_at: session.started_at,
                deadline: Some(session.deadline),
            }),
        }
    }
}

/// Owner of the one live session
pub struct SessionManager {
    settings: SessionSettings,
    gateway: Arc<NotificationGateway>,
    watcher: StreamReadyWatcher,
    slot: Mutex<Slot>,
    phase_tx: watch::Sender<SessionPhase>,
    /// Set by `shutdown`; no session starts afterwards
    closed: AtomicBool,
}

impl SessionManager {
    /// Create a manager with no session
    pub fn new(settings: SessionSettings, gateway: Arc<NotificationGateway>) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        let watcher = StreamReadyWatcher::new(settings.poll_interval);

        Arc::new(Self {
            settings,
            gateway,
            watcher,
            slot: Mutex::new(Slot::Idle),
            phase_tx,
            closed: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current phase
    pub async fn phase(&self) -> SessionPhase {
        self.slot.lock().await.phase()
    }

    /// Subscribe to phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Current session, if any
    pub async fn current(&self) -> Option<SessionSnapshot> {
        self.slot.lock().await.snapshot()
    }

    /// True while the readiness watch is armed
    pub async fn is_watching(&self) -> bool {
        self.watcher.is_armed().await
    }

    /// Replace the slot, enforcing the phase machine
    fn transition(&self, slot: &mut Slot, next: Slot) -> Result<Slot> {
        let from = slot.phase();
        let to = next.phase();

        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let previous = std::mem::replace(slot, next);
        self.phase_tx.send_replace(to);
        debug!(%from, %to, "Session transition");
        Ok(previous)
    }

    /// Offer a trigger. Dropped silently while a session is starting or running.
    #[instrument(skip_all, fields(camera = %camera.info().name, trigger = %trigger))]
    pub async fn on_trigger(self: &Arc<Self>, camera: Arc<dyn Camera>, trigger: TriggerKind) -> TriggerOutcome {
        let info = camera.info().clone();
        let id = SessionId::new();

        {
            let mut slot = self.slot.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                debug!("Manager shut down, ignoring trigger");
                return TriggerOutcome::Ignored;
            }
            if slot.phase().is_busy() {
                debug!(phase = %slot.phase(), "Session in progress, ignoring trigger");
                return TriggerOutcome::Ignored;
            }

            let starting = Slot::Starting {
                id,
                camera: info.clone(),
                trigger,
                started_at: Utc::now(),
            };
            if let Err(e) = self.transition(&mut slot, starting) {
                warn!(error = %e, "Could not claim session slot");
                return TriggerOutcome::Ignored;
            }
        }

        match trigger {
            TriggerKind::Doorbell => {
                info!("{} had its doorbell rung! Preparing video stream.", info.name)
            }
            TriggerKind::Motion => {
                info!("{} has sensed motion. Preparing video stream.", info.name)
            }
            TriggerKind::Other => info!(
                "{} was summoned by something other than a ring or motion. Preparing video stream.",
                info.name
            ),
        }

        match self.start(camera.as_ref(), id).await {
            Ok(true) => TriggerOutcome::Started(id),
            Ok(false) => TriggerOutcome::Ignored,
            Err(e) => {
                self.abort_start(id, &info, &e).await;
                TriggerOutcome::Failed
            }
        }
    }

    /// Reset the directory, arm the watch, start the backend, then go active.
    ///
    /// Returns false if the slot was released (shutdown) while starting.
    async fn start(self: &Arc<Self>, camera: &dyn Camera, id: SessionId) -> Result<bool> {
        janitor::reset(&self.settings.output_dir).await?;

        let manifest = self.settings.manifest_path();
        let this = Arc::clone(self);
        self.watcher
            .arm(
                &self.settings.output_dir,
                &self.settings.manifest_name,
                self.settings.ready_window,
                move |path| {
                    tokio::spawn(async move { this.announce(id, path).await });
                },
            )
            .await;

        if !self.still_starting(id).await {
            // Shut down between the directory reset and arming
            self.watcher.disarm().await;
            return Ok(false);
        }

        let call = camera
            .stream_video(HlsOutputArgs::live(manifest))
            .await
            .map_err(|e| match e {
                Error::StreamStart { .. } => e,
                other => Error::stream_start(camera.info().name.clone(), other),
            })?;
        let (control, ended) = call.into_parts();

        let mut slot = self.slot.lock().await;
        let claimed = match &*slot {
            Slot::Starting {
                id: current,
                camera,
                trigger,
                started_at,
            } if *current == id => Some((camera.clone(), *trigger, *started_at)),
            _ => None,
        };
        let Some((camera_info, trigger, started_at)) = claimed else {
            // Shut down while the backend was starting
            warn!(session_id = %id, "Session slot released during start, stopping backend");
            control.stop();
            drop(slot);
            self.watcher.disarm().await;
            return Ok(false);
        };

        let max_duration = self.settings.max_duration;
        let deadline = Utc::now()
            + chrono::Duration::from_std(max_duration).unwrap_or_else(|_| chrono::Duration::zero());

        let this = Arc::clone(self);
        let deadline_task = tokio::spawn(async move {
            tokio::time::sleep(max_duration).await;
            this.expire(id).await;
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            // A dropped sender also means the call is over
            let _ = ended.await;
            this.finish(id).await;
        });

        self.transition(
            &mut slot,
            Slot::Active(ActiveSession {
                id,
                camera: camera_info,
                trigger,
                started_at,
                deadline,
                call: control,
                deadline_task,
            }),
        )?;

        info!(session_id = %id, max_duration_s = max_duration.as_secs_f64(), "Video stream running");
        Ok(true)
    }

    async fn still_starting(&self, id: SessionId) -> bool {
        let slot = self.slot.lock().await;
        slot.id() == Some(id) && slot.phase() == SessionPhase::Starting
    }

    /// Undo a failed start so later triggers are accepted
    async fn abort_start(&self, id: SessionId, camera: &CameraInfo, error: &Error) {
        warn!(session_id = %id, camera = %camera.name, code = error.error_code(), error = %error, "Session start failed");

        self.watcher.disarm().await;

        let mut slot = self.slot.lock().await;
        if slot.id() == Some(id) && slot.phase() == SessionPhase::Starting {
            let _ = self.transition(&mut slot, Slot::Idle);
        }
        drop(slot);

        self.gateway.error(format!("Unable to start video stream for {}: {}", camera.name, error));
    }

    /// Readiness callback from the watcher
    async fn announce(&self, id: SessionId, path: PathBuf) {
        {
            let slot = self.slot.lock().await;
            let live = slot.id() == Some(id)
                && matches!(slot.phase(), SessionPhase::Starting | SessionPhase::Active);
            if !live {
                debug!(session_id = %id, "Readiness for a finished session, ignoring");
                return;
            }
            self.gateway.stream_available();
        }

        match playlist::inspect(&path).await {
            Ok(summary) => info!(
                session_id = %id,
                segments = summary.segments,
                media_sequence = summary.media_sequence,
                target_duration = summary.target_duration,
                "Playlist ready"
            ),
            Err(e) => debug!(session_id = %id, error = %e, "Playlist not parseable yet"),
        }
    }

    /// Deadline fired: ask the backend to stop, completion does the rest
    async fn expire(&self, id: SessionId) {
        let mut slot = self.slot.lock().await;
        if slot.id() != Some(id) || slot.phase() != SessionPhase::Active {
            return;
        }

        info!(session_id = %id, "timeout hit");

        let current = std::mem::replace(&mut *slot, Slot::Idle);
        *slot = match current {
            Slot::Active(session) => {
                session.call.stop();
                Slot::Stopping(session)
            }
            other => other,
        };
        self.phase_tx.send_replace(slot.phase());
        debug!(from = %SessionPhase::Active, to = %slot.phase(), "Session transition");
    }

    /// Backend reported completion. Runs once per session; later calls are no-ops.
    async fn finish(&self, id: SessionId) {
        let mut slot = self.slot.lock().await;
        if slot.id() != Some(id) || !matches!(slot.phase(), SessionPhase::Active | SessionPhase::Stopping) {
            debug!(session_id = %id, "Completion for a finished session, ignoring");
            return;
        }

        let previous = match self.transition(&mut slot, Slot::Idle) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Unexpected session state at completion");
                return;
            }
        };

        if let Slot::Active(session) | Slot::Stopping(session) = previous {
            session.deadline_task.abort();
            info!(
                session_id = %id,
                elapsed_ms = (Utc::now() - session.started_at).num_milliseconds(),
                "{} video stream has ended",
                session.camera.name
            );
        }

        self.gateway.stream_ended();
        self.watcher.disarm().await;
    }

    /// Stop whatever is running and empty the output directory.
    ///
    /// Later triggers are ignored.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.watcher.disarm().await;

        let (previous, announced) = {
            let mut slot = self.slot.lock().await;
            let previous = std::mem::replace(&mut *slot, Slot::Idle);
            self.phase_tx.send_replace(SessionPhase::Idle);
            // Readiness is only announced under the slot lock
            (previous, self.gateway.is_displaying())
        };

        match previous {
            Slot::Active(session) | Slot::Stopping(session) => {
                info!(session_id = %session.id, "Stopping video stream for shutdown");
                session.deadline_task.abort();
                session.call.stop();
                self.gateway.stream_ended();
            }
            Slot::Starting { id, .. } => {
                debug!(session_id = %id, "Shutdown during session start");
                if announced {
                    self.gateway.stream_ended();
                }
            }
            Slot::Idle => {}
        }

        if let Err(e) = janitor::reset(&self.settings.output_dir).await {
            warn!(error = %e, "Could not clean output directory on shutdown");
        }
    }
}
