//! Common error types for drivesync.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for drivesync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential acquisition or refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Local file could not be read at upload time.
    #[error("Upload error: {}: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Storage backend rejected a list/create/update call.
    #[error("Remote error: {0}")]
    Remote(String),

    /// Storage backend denied access (permissions, quota).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Filesystem notification facility failed.
    #[error("Watch error: {0}")]
    Watch(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the backend rejected the call (network, quota, permission).
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Remote(_) | Error::PermissionDenied(_) | Error::NotFound(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
