//! Error types for Porchlight Core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Must provide ring2faRefreshToken within the porchlight configuration.")]
    MissingCredential,

    #[error("ringEmail and ringPwd are no longer valid configuration properties. A 2 factor authentication (2fa) refresh token is required. Must use ring2faRefreshToken property in config.")]
    DeprecatedCredentials,

    // Provider errors
    #[error("No cameras were found! Check console for more info.")]
    NoCameras,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Provider error: {0}")]
    Provider(String),

    // Session errors
    #[error("Failed to start video stream for {camera}: {reason}")]
    StreamStart { camera: String, reason: String },

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Failed to reset output directory {}: {source}", path.display())]
    DirectoryReset {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    // Persistence errors
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    // Playlist errors
    #[error("Failed to parse playlist: {0}")]
    PlaylistParse(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a stream start error
    pub fn stream_start(camera: impl Into<String>, reason: impl ToString) -> Self {
        Error::StreamStart {
            camera: camera.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error must abort startup
    pub fn is_fatal_to_startup(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_) | Error::MissingCredential | Error::DeprecatedCredentials
        )
    }

    /// Returns the error code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::MissingCredential => "MISSING_CREDENTIAL",
            Error::DeprecatedCredentials => "DEPRECATED_CREDENTIALS",
            Error::NoCameras => "NO_CAMERAS",
            Error::Authentication(_) => "AUTHENTICATION",
            Error::Provider(_) => "PROVIDER",
            Error::StreamStart { .. } => "STREAM_START",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::DirectoryReset { .. } => "DIRECTORY_RESET",
            Error::Spawn { .. } => "SPAWN",
            Error::CredentialStore(_) => "CREDENTIAL_STORE",
            Error::PlaylistParse(_) => "PLAYLIST_PARSE",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}
