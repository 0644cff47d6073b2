//! Common error types for Stowaway.

use thiserror::Error;

/// Top-level error type for storage and gateway operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Dialing a backend failed (unknown kind, rejected configuration, unreachable provider).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend rejected or failed a listing or lookup call.
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Destination refused the write because it is out of space.
    #[error("Quota exceeded: {0}")]
    Quota(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether this error reports a missing container or item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
