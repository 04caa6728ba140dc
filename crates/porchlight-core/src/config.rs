//! Monitoring configuration
//!
//! `MonitorConfig` is what the user writes; it is validated once before
//! monitoring begins and is immutable afterwards. `SessionSettings` carries
//! the runtime knobs the session manager needs, derived from the config.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for `ringMinutesToStreamVideo`
pub const MAX_STREAM_MINUTES: f64 = 5.0;

/// Manifest name the streaming backend writes and the watcher waits for
pub const MANIFEST_FILE_NAME: &str = "stream.m3u8";

/// Environment key stored in the credential file
pub const CREDENTIAL_KEY: &str = "RING_2FA_REFRESH_TOKEN";

/// User-facing monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    /// Legacy login, rejected by `validate`
    pub ring_email: Option<String>,
    /// Legacy login, rejected by `validate`
    pub ring_pwd: Option<String>,
    /// Long-lived refresh credential used on first start
    #[serde(rename = "ring2faRefreshToken")]
    pub ring_2fa_refresh_token: Option<String>,
    /// Maximum length of one live session
    pub ring_minutes_to_stream_video: f64,
    /// Also start sessions on new motion
    pub ring_stream_motion: bool,
    /// Display width, passed through to the display layer
    pub ring_video_width: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ring_email: None,
            ring_pwd: None,
            ring_2fa_refresh_token: None,
            ring_minutes_to_stream_video: 1.5,
            ring_stream_motion: false,
            ring_video_width: "600".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Reject settings that must never reach the session manager
    pub fn validate(&self) -> Result<()> {
        if self.ring_email.is_some() || self.ring_pwd.is_some() {
            return Err(Error::DeprecatedCredentials);
        }

        match self.ring_2fa_refresh_token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => return Err(Error::MissingCredential),
        }

        let minutes = self.ring_minutes_to_stream_video;
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(Error::InvalidConfig(
                "ringMinutesToStreamVideo must be a positive number".to_string(),
            ));
        }
        if minutes > MAX_STREAM_MINUTES {
            return Err(Error::InvalidConfig(format!(
                "ringMinutesToStreamVideo configuration property can not be larger than {}",
                MAX_STREAM_MINUTES
            )));
        }

        Ok(())
    }

    /// Session ceiling as a duration (`minutes * 60` seconds)
    pub fn max_stream_duration(&self) -> Duration {
        Duration::from_secs_f64(self.ring_minutes_to_stream_video * 60.0)
    }

    /// Credential value, if configured
    pub fn credential(&self) -> Option<&str> {
        self.ring_2fa_refresh_token.as_deref()
    }
}

/// Runtime settings for the session manager
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory the backend writes segments and the manifest into
    pub output_dir: PathBuf,
    /// Base name of the manifest the watcher waits for
    pub manifest_name: String,
    /// How long the watcher waits for the manifest
    pub ready_window: Duration,
    /// How often the watcher scans the output directory
    pub poll_interval: Duration,
    /// Forced stop after this long
    pub max_duration: Duration,
}

impl SessionSettings {
    /// Settings rooted at `base`: video goes to `<base>/public`
    pub fn new(base: &Path, max_duration: Duration) -> Self {
        Self {
            output_dir: base.join("public"),
            max_duration,
            ..Default::default()
        }
    }

    /// Derive settings from a validated config
    pub fn from_config(base: &Path, config: &MonitorConfig) -> Self {
        Self::new(base, config.max_stream_duration())
    }

    /// Full path of the manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_name)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public"),
            manifest_name: MANIFEST_FILE_NAME.to_string(),
            ready_window: Duration::from_secs(15),
            poll_interval: Duration::from_millis(250),
            max_duration: Duration::from_secs(90),
        }
    }
}

/// Location of the credential file under `base`
pub fn credential_path(base: &Path) -> PathBuf {
    base.join(".env")
}
