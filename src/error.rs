use std::io;
use thiserror::Error;

/// Error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A pool was requested with zero worker threads.
    #[error("Thread pool size must be at least 1")]
    InvalidSize,

    /// The OS refused to spawn a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(io::Error),

    /// The backing pool could not be built.
    #[error("Failed to build thread pool: {0}")]
    Build(String),

    /// The pool has already been shut down.
    #[error("Thread pool is shut down")]
    ShutDown,

    /// Error with a string message.
    #[error("{0}")]
    StringError(String),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
