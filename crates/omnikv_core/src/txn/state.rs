//! Transaction state and buffers.

use crate::error::{EngineError, EngineResult};
use crate::types::{CollectionId, CommitPoint, Generation, Key};
use omnikv_backend::Backend;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// State of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// The transaction accepts reads and writes.
    Active,
    /// The transaction committed; its writes are visible.
    Committed,
    /// The commit lost the optimistic concurrency race. Buffers are
    /// preserved for inspection or retry until the handle is begun
    /// again or dropped.
    Conflicted,
}

/// Releases a pinned backend snapshot when dropped.
pub(crate) struct SnapshotGuard {
    backend: Arc<dyn Backend>,
    point: CommitPoint,
}

impl SnapshotGuard {
    pub(crate) fn new(backend: Arc<dyn Backend>, point: CommitPoint) -> Self {
        Self { backend, point }
    }

    pub(crate) fn point(&self) -> CommitPoint {
        self.point
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if let Err(err) = self.backend.release_snapshot(self.point) {
            tracing::warn!(point = %self.point, error = %err, "failed to release snapshot");
        }
    }
}

impl fmt::Debug for SnapshotGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotGuard")
            .field("point", &self.point)
            .finish_non_exhaustive()
    }
}

/// An isolated unit of work.
///
/// Writes are buffered privately (last write to a key wins) and reads
/// are served write-set first, so a transaction always observes its own
/// effects. With the snapshot option, reads outside the write-set are
/// pinned to the state at begin; with read-tracking, each read records
/// the commit point it observed for validation at commit.
///
/// A handle outlives its outcome: after commit or conflict it can be
/// begun again with a fresh generation, reusing its allocations.
/// Dropping the handle frees its buffers and releases any snapshot.
pub struct Transaction {
    generation: Generation,
    state: TxnState,
    snapshot: Option<SnapshotGuard>,
    /// Buffered writes: `None` values are deletions.
    writes: HashMap<(CollectionId, Key), Option<Vec<u8>>>,
    /// Tracked reads and the commit point each observed.
    reads: HashMap<(CollectionId, Key), CommitPoint>,
}

impl Transaction {
    pub(crate) fn new(generation: Generation, snapshot: Option<SnapshotGuard>) -> Self {
        Self {
            generation,
            state: TxnState::Active,
            snapshot,
            writes: HashMap::new(),
            reads: HashMap::new(),
        }
    }

    /// Returns the generation this incarnation was begun with.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Whether the transaction accepts further operations.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Whether reads are pinned to a begin-time snapshot.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// The pinned read point, if the snapshot option was requested.
    #[must_use]
    pub fn snapshot_point(&self) -> Option<CommitPoint> {
        self.snapshot.as_ref().map(SnapshotGuard::point)
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Number of tracked reads.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Iterates the buffered writes; `None` values are deletions.
    ///
    /// Buffers survive commit and conflict, so a caller can log or
    /// replay them until the handle is begun again.
    pub fn pending_writes(&self) -> impl Iterator<Item = (CollectionId, Key, Option<&[u8]>)> {
        self.writes
            .iter()
            .map(|((collection, key), value)| (*collection, *key, value.as_deref()))
    }

    pub(crate) fn buffer_write(
        &mut self,
        collection: CollectionId,
        key: Key,
        value: Option<Vec<u8>>,
    ) -> EngineResult<()> {
        self.ensure_active()?;
        self.writes.insert((collection, key), value);
        Ok(())
    }

    /// The buffered state of a key: `None` when not buffered,
    /// `Some(None)` when buffered as a deletion.
    pub(crate) fn buffered(&self, collection: CollectionId, key: Key) -> Option<Option<&[u8]>> {
        self.writes
            .get(&(collection, key))
            .map(|value| value.as_deref())
    }

    /// Records the commit point a read observed. Keys already written
    /// by this transaction are not tracked (the write wins the commit
    /// anyway), and the first observation of a key is the one that
    /// counts.
    pub(crate) fn record_read(&mut self, collection: CollectionId, key: Key, point: CommitPoint) {
        let slot = (collection, key);
        if !self.writes.contains_key(&slot) {
            self.reads.entry(slot).or_insert(point);
        }
    }

    pub(crate) fn read_set(&self) -> impl Iterator<Item = (CollectionId, Key, CommitPoint)> + '_ {
        self.reads
            .iter()
            .map(|((collection, key), point)| (*collection, *key, *point))
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TxnState::Committed;
    }

    pub(crate) fn mark_conflicted(&mut self) {
        self.state = TxnState::Conflicted;
    }

    /// Re-arms the handle for a new incarnation: buffers are cleared,
    /// the old snapshot (if any) is released.
    pub(crate) fn reset(&mut self, generation: Generation, snapshot: Option<SnapshotGuard>) {
        self.generation = generation;
        self.state = TxnState::Active;
        self.snapshot = snapshot;
        self.writes.clear();
        self.reads.clear();
    }

    pub(crate) fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(EngineError::usage(
                "transaction already committed; begin it again to reuse the handle",
            )),
            TxnState::Conflicted => Err(EngineError::usage(
                "transaction conflicted; begin it again to retry",
            )),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("generation", &self.generation)
            .field("state", &self.state)
            .field("snapshot", &self.snapshot_point())
            .field("writes", &self.writes.len())
            .field("reads", &self.reads.len())
            .finish()
    }
}
