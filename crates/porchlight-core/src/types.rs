//! Core types for Porchlight

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What asked for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Doorbell button pressed
    Doorbell,
    /// New motion reported by the camera
    Motion,
    /// Anything else (manual start, tests)
    Other,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Doorbell => write!(f, "doorbell"),
            TriggerKind::Motion => write!(f, "motion"),
            TriggerKind::Other => write!(f, "other"),
        }
    }
}

/// Lifecycle phase of the single session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session, triggers accepted
    Idle,
    /// Directory reset and backend start in flight
    Starting,
    /// Backend running
    Active,
    /// Stop requested, waiting for the backend to report completion
    Stopping,
}

impl SessionPhase {
    /// Check if transition to target phase is valid
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, target),
            (Idle, Starting) |
            // Start failed or succeeded
            (Starting, Idle) | (Starting, Active) |
            // Natural end or forced stop
            (Active, Idle) | (Active, Stopping) |
            (Stopping, Idle)
        )
    }

    /// True while the guard is held
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionPhase::Idle)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::Stopping => write!(f, "stopping"),
        }
    }
}

/// Camera identity as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub id: String,
    pub name: String,
    pub device_type: String,
}

impl CameraInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: device_type.into(),
        }
    }
}

impl std::fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.id, self.name, self.device_type)
    }
}

/// Non-camera device at a location (sensors, chimes, hubs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub zid: String,
    pub name: String,
    pub device_type: String,
}

/// A doorbell press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoorbellPress {
    pub at: DateTime<Utc>,
}

impl DoorbellPress {
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

/// A motion notification
///
/// `is_new` is false when the provider considers this a continuation of
/// motion it already signaled within its rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub is_new: bool,
    pub at: DateTime<Utc>,
}

impl MotionEvent {
    pub fn new(is_new: bool) -> Self {
        Self {
            is_new,
            at: Utc::now(),
        }
    }
}

/// Provider-issued replacement of the long-lived refresh credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRotation {
    /// Value being replaced; absent on the first rotation after a fresh login
    pub old: Option<String>,
    pub new: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        use SessionPhase::*;

        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Active));
        assert!(Starting.can_transition_to(Idle));
        assert!(Active.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Active));
        assert!(!Starting.can_transition_to(Starting));
        assert!(!Stopping.can_transition_to(Active));
    }

    #[test]
    fn test_busy() {
        assert!(!SessionPhase::Idle.is_busy());
        assert!(SessionPhase::Starting.is_busy());
        assert!(SessionPhase::Stopping.is_busy());
    }

    #[test]
    fn test_camera_display() {
        let camera = CameraInfo::new("42", "Front Door", "doorbell_v3");
        assert_eq!(camera.to_string(), "42: Front Door (doorbell_v3)");
    }
}
