//! Error types for backend operations.

use crate::types::CommitPoint;
use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur inside a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error occurred while persisting or loading data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend detected an invariant violation in stored data.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The backend does not implement the requested capability.
    #[error("backend does not support {0}")]
    Unsupported(String),

    /// A snapshot point was released that was never pinned.
    #[error("snapshot at {0} is not pinned")]
    UnknownSnapshot(CommitPoint),

    /// The backend ran out of memory servicing a request.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl BackendError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates an unsupported-capability error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }
}
