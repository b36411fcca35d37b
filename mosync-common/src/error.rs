//! Common error types for mosync

use thiserror::Error;

/// Common result type for mosync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the mosync crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML settings file could not be parsed
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON timeline description could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
