use std::time::Duration;

pub type Result<T> = std::result::Result<T, CoordError>;

/// Errors surfaced by coordination namespace clients.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("node not found: {0}")]
    NoNode(String),

    #[error("parent node missing for: {0}")]
    NoParent(String),

    #[error("node has children: {0}")]
    NotEmpty(String),

    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("lock on {path} not acquired within {timeout:?}")]
    LockTimeout { path: String, timeout: Duration },

    #[error("coordination transport failure: {0}")]
    Transport(String),
}
