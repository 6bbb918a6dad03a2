//! # OmniKV Backend
//!
//! Storage backend trait and reference implementation for OmniKV.
//!
//! This crate defines the capability surface every OmniKV backend must
//! provide. Backends are **versioned key-value stores**: they hold opaque
//! byte values addressed by `(collection, key)` pairs and apply atomic
//! write batches stamped with engine-assigned commit points. The engine
//! owns argument decoding, transactions and result packing - backends do
//! not understand arenas, tapes or option bits.
//!
//! ## Design Principles
//!
//! - Backends apply whole batches atomically at a single commit point
//! - Reads may be pinned to an earlier commit point (snapshots)
//! - Estimates are allowed to be loose, but must bound the truth
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - In-memory store with per-key version chains
//!
//! ## Example
//!
//! ```rust
//! use omnikv_backend::{Backend, MemoryBackend, WriteOp};
//! use omnikv_backend::types::{CollectionId, CommitPoint};
//!
//! let backend = MemoryBackend::new();
//! let op = WriteOp::put(CollectionId::new(0), 7, b"value".to_vec());
//! backend.apply(CommitPoint::new(1), &[op], false).unwrap();
//! let hit = backend.get(CollectionId::new(0), 7, None).unwrap();
//! assert_eq!(hit.value.as_deref(), Some(&b"value"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
pub mod types;

pub use backend::{Backend, BackendUsage, Capabilities, Lookup, ScanEntry, SizeEstimate, WriteOp};
pub use error::{BackendError, BackendResult};
pub use memory::MemoryBackend;
