//! Transaction manager: generations, commit points and OCC validation.

use crate::error::{EngineError, EngineResult};
use crate::options::Options;
use crate::stats::DatabaseStats;
use crate::txn::state::{SnapshotGuard, Transaction};
use crate::types::{CollectionId, CommitPoint, Generation, Key};
use omnikv_backend::{Backend, WriteOp};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coordinates transactions and the global commit order.
///
/// Commit points are allocated here and handed to the backend; one
/// commit mutex serializes OCC validation with batch application, so a
/// validated read-set cannot be invalidated between validation and the
/// apply. Non-transactional batch writes take the same lock and the
/// same point sequence, which makes the commit order total across both
/// paths.
pub(crate) struct TransactionManager {
    backend: Arc<dyn Backend>,
    stats: Arc<DatabaseStats>,
    /// Source of engine-assigned generations.
    next_generation: AtomicU64,
    /// Every generation handed out or claimed this session.
    used_generations: Mutex<HashSet<u64>>,
    /// Source of commit points.
    next_point: AtomicU64,
    /// Highest point made visible so far.
    committed_point: AtomicU64,
    /// Serializes validation and batch application.
    commit_lock: Mutex<()>,
}

impl TransactionManager {
    pub(crate) fn new(backend: Arc<dyn Backend>, stats: Arc<DatabaseStats>) -> Self {
        Self {
            backend,
            stats,
            next_generation: AtomicU64::new(1),
            used_generations: Mutex::new(HashSet::new()),
            next_point: AtomicU64::new(1),
            committed_point: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
        }
    }

    /// Begins a fresh transaction.
    pub(crate) fn begin(&self, generation: u64, options: Options) -> EngineResult<Transaction> {
        options.ensure_allowed(Options::TXN_SNAPSHOT, "txn_begin")?;
        let generation = self.claim_generation(generation)?;
        let snapshot = self.maybe_pin(options)?;
        self.stats.record_txn_begin();
        tracing::debug!(%generation, snapshot = snapshot.is_some(), "transaction begun");
        Ok(Transaction::new(generation, snapshot))
    }

    /// Re-arms an existing handle, whatever state it is in.
    pub(crate) fn restart(
        &self,
        txn: &mut Transaction,
        generation: u64,
        options: Options,
    ) -> EngineResult<()> {
        options.ensure_allowed(Options::TXN_SNAPSHOT, "txn_begin")?;
        let generation = self.claim_generation(generation)?;
        let snapshot = self.maybe_pin(options)?;
        txn.reset(generation, snapshot);
        self.stats.record_txn_begin();
        Ok(())
    }

    /// Serves a transactional point read: write-set first, then the
    /// snapshot or the live store.
    pub(crate) fn read(
        &self,
        txn: &mut Transaction,
        collection: CollectionId,
        key: Key,
        track: bool,
    ) -> EngineResult<Option<Vec<u8>>> {
        txn.ensure_active()?;
        if let Some(buffered) = txn.buffered(collection, key) {
            return Ok(buffered.map(<[u8]>::to_vec));
        }
        let hit = self.backend.get(collection, key, txn.snapshot_point())?;
        if track {
            txn.record_read(collection, key, hit.point);
        }
        Ok(hit.value)
    }

    /// Commits a transaction under optimistic concurrency control.
    pub(crate) fn commit(
        &self,
        txn: &mut Transaction,
        options: Options,
    ) -> EngineResult<CommitPoint> {
        options.ensure_allowed(Options::WRITE_FLUSH, "txn_commit")?;
        txn.ensure_active()?;

        let _guard = self.commit_lock.lock();

        // A tracked read is invalidated if any later commit touched its
        // key, whether or not the value changed back.
        let read_set: Vec<_> = txn.read_set().collect();
        for (collection, key, observed) in read_set {
            let current = self.backend.get(collection, key, None)?.point;
            if current > observed {
                txn.mark_conflicted();
                self.stats.record_txn_conflict();
                tracing::debug!(generation = %txn.generation(), %collection, key, "commit conflict");
                return Err(EngineError::Conflict { collection, key });
            }
        }

        let ops: Vec<WriteOp> = txn
            .pending_writes()
            .map(|(collection, key, value)| WriteOp {
                collection,
                key,
                value: value.map(<[u8]>::to_vec),
            })
            .collect();

        let point = self.alloc_point();
        self.backend
            .apply(point, &ops, options.contains(Options::WRITE_FLUSH))?;
        self.committed_point.store(point.as_u64(), Ordering::SeqCst);

        txn.mark_committed();
        self.stats.record_txn_commit();
        tracing::debug!(generation = %txn.generation(), %point, writes = ops.len(), "transaction committed");
        Ok(point)
    }

    /// Applies a non-transactional batch atomically at a fresh commit
    /// point.
    pub(crate) fn commit_live(&self, ops: &[WriteOp], flush: bool) -> EngineResult<CommitPoint> {
        let _guard = self.commit_lock.lock();
        let point = self.alloc_point();
        self.backend.apply(point, ops, flush)?;
        self.committed_point.store(point.as_u64(), Ordering::SeqCst);
        Ok(point)
    }

    /// The highest commit point made visible so far.
    pub(crate) fn committed_point(&self) -> CommitPoint {
        CommitPoint::new(self.committed_point.load(Ordering::SeqCst))
    }

    fn alloc_point(&self) -> CommitPoint {
        CommitPoint::new(self.next_point.fetch_add(1, Ordering::SeqCst))
    }

    fn maybe_pin(&self, options: Options) -> EngineResult<Option<SnapshotGuard>> {
        if !options.contains(Options::TXN_SNAPSHOT) {
            return Ok(None);
        }
        if !self.backend.capabilities().snapshots {
            return Err(EngineError::unsupported("snapshots"));
        }
        let point = self.backend.pin_snapshot()?;
        Ok(Some(SnapshotGuard::new(Arc::clone(&self.backend), point)))
    }

    /// Claims a generation: `0` asks the engine to assign one; anything
    /// else must be unique for the session.
    fn claim_generation(&self, requested: u64) -> EngineResult<Generation> {
        let mut used = self.used_generations.lock();
        if requested == 0 {
            loop {
                let candidate = self.next_generation.fetch_add(1, Ordering::SeqCst);
                if used.insert(candidate) {
                    return Ok(Generation::new(candidate));
                }
            }
        }
        if used.insert(requested) {
            Ok(Generation::new(requested))
        } else {
            Err(EngineError::usage(format!(
                "generation {requested} was already used this session"
            )))
        }
    }
}
