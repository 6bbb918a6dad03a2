//! # OmniKV Core
//!
//! The core of a universal key-value engine: one transactional,
//! batch-oriented contract in front of any storage backend.
//!
//! This crate provides:
//! - The batch data-plane: strided reads, writes, scans and size
//!   estimates packed into caller-reused arenas
//! - ACID transactions with optional snapshot isolation and
//!   read-tracking, committed under optimistic concurrency control
//! - The collection registry (named key spaces plus the anonymous
//!   default)
//! - A free-form control channel for operational commands
//!
//! Storage itself is pluggable: anything implementing
//! [`omnikv_backend::Backend`] slots in behind the same contract.
//!
//! ## Example
//!
//! ```rust
//! use omnikv_core::{Arena, Database, Options, ReadBatch, WriteBatch};
//!
//! let db = Database::open_in_memory()?;
//! let mut arena = Arena::new();
//!
//! let keys = [1i64, 2, 3];
//! let values: [Option<&[u8]>; 3] = [Some(b"a"), Some(b"bb"), None];
//! db.write(
//!     None,
//!     &WriteBatch::new(&keys).per_task_values(&values),
//!     Options::NONE,
//! )?;
//!
//! let found = db.read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)?;
//! assert_eq!(found.value(0), Some(&b"a"[..]));
//! assert_eq!(found.value_len(1), Some(2));
//! assert_eq!(found.value_len(2), None); // deleted, reported as missing
//! # Ok::<(), omnikv_core::EngineError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod arena;
mod batch;
mod collection;
mod config;
mod control;
mod database;
mod error;
mod options;
mod stats;
mod strided;
mod txn;
mod types;

pub use arena::{Arena, ReadResult, ScanResult};
pub use batch::{ReadBatch, ScanBatch, SizeBatch, Values, WriteBatch};
pub use config::DbConfig;
pub use database::Database;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use options::Options;
pub use stats::{DatabaseStats, StatsSnapshot};
pub use strided::{Strided, StridedItem};
pub use txn::{Transaction, TxnState};
pub use types::{
    CollectionId, CommitPoint, Generation, Key, ValueLen, DEFAULT_COLLECTION,
    MISSING_VALUE_LENGTH, UNKNOWN_KEY,
};

pub use omnikv_backend::{Backend, SizeEstimate};
