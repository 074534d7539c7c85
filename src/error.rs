//! Error types for the later daemon.

/// Top-level error type for the deferred-execution daemon.
#[derive(Debug, thiserror::Error)]
pub enum LaterError {
    /// Request was recognized but carried missing or malformed fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Cancellation target is not an active task.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request action is not part of the protocol.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Snapshot read/write error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Child process spawn or wait error.
    #[error("execution error: {0}")]
    Execution(String),

    /// Socket or wire-format error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LaterError>;
