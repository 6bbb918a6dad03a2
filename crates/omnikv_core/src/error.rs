//! Error types for the engine.

use crate::types::{CollectionId, Key};
use omnikv_backend::BackendError;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed arguments: null required input, broadcast keys,
    /// unknown option bits, reused generations.
    Usage,
    /// A named entity (collection) does not exist.
    NotFound,
    /// A named entity already exists.
    Exists,
    /// A transaction commit lost the optimistic concurrency race.
    Conflict,
    /// The engine or backend ran out of memory.
    OutOfMemory,
    /// The backend failed to persist or load data.
    Io,
    /// The backend lacks a requested capability.
    Unsupported,
    /// A stored invariant was found violated; fatal for the handle.
    Corruption,
}

/// Errors produced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed arguments.
    #[error("usage error: {message}")]
    Usage {
        /// Description of the misuse.
        message: String,
    },

    /// Collection name lookup failed.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// A named entity already exists.
    #[error("already exists: {what}")]
    AlreadyExists {
        /// Description of the entity.
        what: String,
    },

    /// A transaction commit was invalidated by a concurrent commit.
    #[error("commit conflict on key {key} in {collection}")]
    Conflict {
        /// The collection where the conflict was detected.
        collection: CollectionId,
        /// The key that conflicted.
        key: Key,
    },

    /// Allocation failed.
    #[error("out of memory: {message}")]
    OutOfMemory {
        /// Description of the failed allocation.
        message: String,
    },

    /// I/O error from the backend or the platform.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend lacks a requested capability.
    #[error("unsupported: {feature}")]
    Unsupported {
        /// The missing feature.
        feature: String,
    },

    /// Detected invariant violation in stored data.
    ///
    /// Corruption is fatal for the database handle: once observed,
    /// subsequent calls keep returning it.
    #[error("corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },
}

impl EngineError {
    /// Creates a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a collection-not-found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an already-exists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Creates an unsupported-capability error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage { .. } => ErrorKind::Usage,
            Self::CollectionNotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::Exists,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::Io(_) => ErrorKind::Io,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Corruption { .. } => ErrorKind::Corruption,
        }
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Io(io) => Self::Io(io),
            BackendError::Corrupted(message) => Self::Corruption { message },
            BackendError::Unsupported(feature) => Self::Unsupported { feature },
            BackendError::UnknownSnapshot(point) => {
                Self::usage(format!("snapshot at {point} is not pinned"))
            }
            BackendError::OutOfMemory(message) => Self::OutOfMemory { message },
        }
    }
}
