//! Error types for mosync-player
//!
//! Playback failures never surface as errors from the orchestrator; they
//! resolve into status events. These errors cover loading and building.

use thiserror::Error;

/// Main error type for mosync-player
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared crate (config, IO, parsing)
    #[error(transparent)]
    Common(#[from] mosync_common::Error),

    /// Timeline description cannot be turned into a tree at all
    #[error("Timeline error: {0}")]
    Timeline(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Playback device errors
    #[error("Device error: {0}")]
    Device(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Common(mosync_common::Error::Json(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Common(mosync_common::Error::Io(e))
    }
}

/// Convenience Result type using mosync-player Error
pub type Result<T> = std::result::Result<T, Error>;
