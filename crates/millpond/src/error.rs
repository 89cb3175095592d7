// Error types for millpond operations
use std::time::Duration;

use coordns::CoordError;

pub type Result<T> = std::result::Result<T, FsError>;

/// Every failure a filesystem operation can surface. Backend-native errors
/// are always wrapped into `BackendFailure` so callers never branch on
/// backend identity.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("structural conflict: {0}")]
    StructuralConflict(String),

    #[error("stale write on {path}: stored version {stored} is newer than {proposed}")]
    StaleWrite {
        path: String,
        stored: u64,
        proposed: u64,
    },

    #[error("lock conflict on {path}: held by {holder}")]
    LockConflict { path: String, holder: String },

    #[error("lock on {0} not acquired within the configured timeout")]
    LockTimeout(String),

    #[error("backend failure: {0}")]
    BackendFailure(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("coordination error: {0}")]
    Coord(CoordError),
}

impl From<CoordError> for FsError {
    fn from(err: CoordError) -> Self {
        match err {
            CoordError::LockTimeout { path, .. } => FsError::LockTimeout(path),
            other => FsError::Coord(other),
        }
    }
}

impl FsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        FsError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        FsError::StructuralConflict(what.into())
    }

    pub fn backend(what: impl std::fmt::Display) -> Self {
        FsError::BackendFailure(what.to_string())
    }

    pub fn config(what: impl Into<String>) -> Self {
        FsError::ConfigurationError(what.into())
    }
}
