//! Storage backend trait definition.

use crate::error::BackendResult;
use crate::types::{CollectionId, CommitPoint, Key, ValueLen};

/// A single write within an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    /// The collection the key lives in.
    pub collection: CollectionId,
    /// The key being written.
    pub key: Key,
    /// The new value, or `None` to remove the key.
    pub value: Option<Vec<u8>>,
}

impl WriteOp {
    /// Creates a put operation.
    #[must_use]
    pub fn put(collection: CollectionId, key: Key, value: Vec<u8>) -> Self {
        Self {
            collection,
            key,
            value: Some(value),
        }
    }

    /// Creates a delete operation.
    #[must_use]
    pub fn delete(collection: CollectionId, key: Key) -> Self {
        Self {
            collection,
            key,
            value: None,
        }
    }
}

/// Result of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lookup {
    /// The value visible at the requested point, or `None` if absent.
    pub value: Option<Vec<u8>>,
    /// Commit point of the record that was observed.
    ///
    /// A removal (tombstone) carries the point of the removing commit;
    /// a key that was never written reports `CommitPoint(0)`.
    pub point: CommitPoint,
}

/// One `(key, value length)` pair returned by a range scan.
pub type ScanEntry = (Key, ValueLen);

/// Loose bounds over a key range, as reported by [`Backend::estimate_size`].
///
/// Each pair is `(min, max)` and must bound the true value:
/// `min <= truth <= max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    /// Bounds on the number of present keys in the range.
    pub cardinality: (u64, u64),
    /// Bounds on the total bytes of values in the range.
    pub value_bytes: (u64, u64),
    /// Bounds on the persistent memory consumed by the range.
    pub space_usage: (u64, u64),
}

/// Approximate whole-store usage, feeding the `usage` control command.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendUsage {
    /// Number of present keys across all collections.
    pub keys: u64,
    /// Total bytes of live values.
    pub value_bytes: u64,
    /// Approximate resident memory in bytes.
    pub ram_bytes: u64,
    /// Approximate on-disk footprint in bytes.
    pub disk_bytes: u64,
}

/// Optional features a backend may provide.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether [`Backend::pin_snapshot`] provides a stable read point.
    pub snapshots: bool,
}

/// The capability surface every OmniKV backend must provide.
///
/// Backends are versioned stores of `(collection, key) -> bytes`. The
/// engine assigns commit points and calls [`Backend::apply`] with whole
/// batches; the backend must make each batch visible atomically, so that
/// a concurrent [`Backend::get`] observes either all of a batch or none
/// of it.
///
/// # Invariants
///
/// - `apply` is atomic with respect to concurrent reads
/// - `get` and `scan_range` at point `p` observe exactly the commits
///   with points `<= p`; with no point, they observe the latest state
/// - versions at or before a pinned snapshot point remain readable until
///   the point is released
/// - estimates bound the truth: `min <= true value <= max`
pub trait Backend: Send + Sync {
    /// Looks up `key` in `collection`.
    ///
    /// With `at: Some(p)`, the lookup observes the store as of commit
    /// point `p`; otherwise it observes the latest committed state.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or detected corruption.
    fn get(&self, collection: CollectionId, key: Key, at: Option<CommitPoint>)
        -> BackendResult<Lookup>;

    /// Applies a write batch atomically at the given commit point.
    ///
    /// The engine guarantees `point` is strictly greater than every
    /// previously applied point. With `flush`, the batch must be durable
    /// before the call returns; otherwise durability follows the backend
    /// default.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure; the batch must not be partially
    /// visible afterwards.
    fn apply(&self, point: CommitPoint, ops: &[WriteOp], flush: bool) -> BackendResult<()>;

    /// Returns up to `limit` present keys `>= min_key` in ascending
    /// order, paired with their value lengths.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or detected corruption.
    fn scan_range(
        &self,
        collection: CollectionId,
        min_key: Key,
        limit: usize,
        at: Option<CommitPoint>,
    ) -> BackendResult<Vec<ScanEntry>>;

    /// Estimates cardinality and sizes for the key range
    /// `[min_key, max_key]`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn estimate_size(
        &self,
        collection: CollectionId,
        min_key: Key,
        max_key: Key,
    ) -> BackendResult<SizeEstimate>;

    /// Pins the latest applied commit point and returns it.
    ///
    /// Until the point is released, reads at it must keep observing the
    /// pinned state regardless of later commits.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::Unsupported`] if the backend has no
    /// snapshot capability.
    fn pin_snapshot(&self) -> BackendResult<CommitPoint>;

    /// Releases a previously pinned snapshot point.
    ///
    /// # Errors
    ///
    /// Returns an error if the point was never pinned.
    fn release_snapshot(&self, point: CommitPoint) -> BackendResult<()>;

    /// Removes all keys, either from one collection or from the whole
    /// store. Collection identity is owned by the engine; the backend
    /// only forgets data.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn clear(&self, collection: Option<CollectionId>) -> BackendResult<()>;

    /// Requests compaction of internal storage. Advisory; may be a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn compact(&self) -> BackendResult<()>;

    /// Reports approximate whole-store usage.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    fn usage(&self) -> BackendResult<BackendUsage>;

    /// Describes the optional capabilities of this backend.
    fn capabilities(&self) -> Capabilities;
}
