//! Porchlight Core - live-session orchestrator for doorbell cameras
//!
//! This crate reacts to camera events and runs at most one live HLS session:
//! - Doorbell and motion subscriptions per camera
//! - Single-slot session manager with a hard duration ceiling
//! - Output directory reset before every session
//! - Readiness watch for the live manifest
//! - Display notifications (error, stream available, stream ended)
//! - Credential persistence across provider rotations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Porchlight Core                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐         ┌──────────────┐                      │
//! │  │   Camera     │────────▶│    Event     │                      │
//! │  │   Provider   │         │  Subscriber  │                      │
//! │  └──────┬───────┘         └──────┬───────┘                      │
//! │         │ rotation               │ trigger                      │
//! │  ┌──────┴───────┐         ┌──────┴───────┐    ┌──────────────┐  │
//! │  │  Credential  │         │   Session    │───▶│ Notification │  │
//! │  │    Store     │         │   Manager    │    │   Gateway    │  │
//! │  └──────────────┘         └──┬───────┬───┘    └──────────────┘  │
//! │                              │       │                          │
//! │                   ┌──────────┴──┐ ┌──┴───────────┐              │
//! │                   │   Janitor   │ │   Watcher    │              │
//! │                   └─────────────┘ └──────────────┘              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod credentials;
pub mod janitor;
pub mod watcher;
pub mod notify;
pub mod encoding;
pub mod provider;
pub mod ffmpeg;
pub mod playlist;
pub mod session;
pub mod subscriber;
pub mod monitor;

pub use error::{Error, Result};
pub use types::*;
pub use config::{MonitorConfig, SessionSettings, MAX_STREAM_MINUTES, MANIFEST_FILE_NAME};
pub use credentials::CredentialStore;
pub use watcher::{StreamReadyWatcher, WatchOutcome};
pub use notify::{ChannelSink, DisplaySink, Notification, NotificationGateway};
pub use encoding::HlsOutputArgs;
pub use provider::{CallControl, Camera, CameraProvider, LiveCall, Location};
pub use ffmpeg::FfmpegBackend;
pub use playlist::PlaylistSummary;
pub use session::{SessionManager, SessionSnapshot, TriggerOutcome};
pub use subscriber::EventSubscriber;
pub use monitor::Monitor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version
pub fn init() {
    tracing::info!(version = VERSION, "Porchlight Core initialized");
}
