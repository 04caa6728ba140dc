//! Notification gateway
//!
//! Translates session transitions into the three one-way notifications the
//! display layer understands:
//! - `DISPLAY_ERROR` with a message
//! - `VIDEO_STREAM_AVAILABLE`
//! - `VIDEO_STREAM_ENDED`

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound display notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "notification",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum Notification {
    /// Show an error message
    DisplayError(String),
    /// Manifest is ready, start the player
    VideoStreamAvailable,
    /// Session finished, clear the player
    VideoStreamEnded,
}

/// Where notifications are delivered
pub trait DisplaySink: Send + Sync {
    fn deliver(&self, notification: Notification);
}

/// Sink backed by an unbounded channel
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn deliver(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            debug!("Display channel closed, notification dropped");
        }
    }
}

/// Gateway between the session manager and the display sink
pub struct NotificationGateway {
    sink: Arc<dyn DisplaySink>,
    /// A stream is currently announced to the display
    displaying: AtomicBool,
}

impl NotificationGateway {
    pub fn new(sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            sink,
            displaying: AtomicBool::new(false),
        }
    }

    /// Report an error to the display
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(message = %message, "Sending error to display");
        self.displaying.store(false, Ordering::SeqCst);
        self.sink.deliver(Notification::DisplayError(message));
    }

    /// Announce the stream. Returns false if it was already announced.
    pub fn stream_available(&self) -> bool {
        if self.displaying.swap(true, Ordering::SeqCst) {
            debug!("Stream already displayed, skipping availability notice");
            return false;
        }
        self.sink.deliver(Notification::VideoStreamAvailable);
        true
    }

    /// Tell the display the stream is gone
    pub fn stream_ended(&self) {
        self.displaying.store(false, Ordering::SeqCst);
        self.sink.deliver(Notification::VideoStreamEnded);
    }

    /// True between `stream_available` and `stream_ended`
    pub fn is_displaying(&self) -> bool {
        self.displaying.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> (NotificationGateway, mpsc::UnboundedReceiver<Notification>) {
        let (sink, rx) = ChannelSink::new();
        (NotificationGateway::new(Arc::new(sink)), rx)
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&Notification::VideoStreamAvailable).unwrap();
        assert_eq!(json, r#"{"notification":"VIDEO_STREAM_AVAILABLE"}"#);

        let json = serde_json::to_string(&Notification::DisplayError("boom".into())).unwrap();
        assert_eq!(json, r#"{"notification":"DISPLAY_ERROR","payload":"boom"}"#);

        let parsed: Notification =
            serde_json::from_str(r#"{"notification":"VIDEO_STREAM_ENDED"}"#).unwrap();
        assert_eq!(parsed, Notification::VideoStreamEnded);
    }

    #[test]
    fn test_available_not_repeated() {
        let (gateway, mut rx) = gateway();

        assert!(gateway.stream_available());
        assert!(!gateway.stream_available());
        gateway.stream_ended();
        assert!(gateway.stream_available());

        assert_eq!(rx.try_recv().unwrap(), Notification::VideoStreamAvailable);
        assert_eq!(rx.try_recv().unwrap(), Notification::VideoStreamEnded);
        assert_eq!(rx.try_recv().unwrap(), Notification::VideoStreamAvailable);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_error_resets_display() {
        let (gateway, mut rx) = gateway();

        gateway.stream_available();
        gateway.error("No cameras were found!");
        assert!(!gateway.is_displaying());

        rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Notification::DisplayError("No cameras were found!".into())
        );
    }
}
