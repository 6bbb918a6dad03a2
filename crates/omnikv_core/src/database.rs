//! Database facade: the public entry point of the engine.

use crate::arena::{pack_scan, Arena, ReadResult, ScanResult, ValueTapeBuilder};
use crate::batch::{
    decode_read, decode_scan, decode_size, decode_write, ReadBatch, ScanBatch, SizeBatch,
    WriteBatch,
};
use crate::collection::CollectionRegistry;
use crate::config::DbConfig;
use crate::control::ControlCommand;
use crate::error::{EngineError, EngineResult};
use crate::options::Options;
use crate::stats::DatabaseStats;
use crate::txn::{SnapshotGuard, Transaction, TransactionManager};
use crate::types::{CollectionId, CommitPoint, Key, ValueLen, DEFAULT_COLLECTION};
use omnikv_backend::{Backend, MemoryBackend, ScanEntry, SizeEstimate, WriteOp};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The main database handle.
///
/// One uniform contract in front of any storage backend: batched
/// reads, writes, scans and size estimates over strided arguments, a
/// collection registry, ACID transactions and an operational control
/// channel.
///
/// # Opening a Database
///
/// Databases open from a JSON configuration naming the backend:
///
/// ```rust
/// use omnikv_core::{Arena, Database, ReadBatch, WriteBatch, Options};
///
/// let db = Database::open(r#"{"engine": "memory"}"#)?;
/// let mut arena = Arena::new();
///
/// let keys = [1i64, 2];
/// let values: [Option<&[u8]>; 2] = [Some(b"a"), Some(b"bb")];
/// db.write(
///     None,
///     &WriteBatch::new(&keys).per_task_values(&values),
///     Options::NONE,
/// )?;
///
/// let found = db.read(None, &ReadBatch::new(&keys), Options::NONE, &mut arena)?;
/// assert_eq!(found.value(1), Some(&b"bb"[..]));
/// # Ok::<(), omnikv_core::EngineError>(())
/// ```
///
/// # Concurrency
///
/// The handle is `Send + Sync`: distinct arenas and distinct
/// transactions may be driven from parallel threads. A single arena or
/// transaction is single-owner, which the borrow checker enforces.
///
/// # Lifecycle
///
/// Dropping the handle releases the engine state. Live transactions
/// keep the backend alive through their own references, so late frees
/// are safe; data of a dropped in-memory database is gone.
pub struct Database {
    config: DbConfig,
    backend: Arc<dyn Backend>,
    registry: CollectionRegistry,
    txns: TransactionManager,
    stats: Arc<DatabaseStats>,
    /// Sticky corruption message; set once, never cleared.
    poison: RwLock<Option<String>>,
}

impl Database {
    /// Opens a database from a JSON configuration document.
    ///
    /// The engine consumes `engine`, `path` and `cache`; other fields
    /// pass through to the backend. `"memory"` is the built-in backend;
    /// an empty document selects it.
    ///
    /// # Errors
    ///
    /// Returns a usage error for malformed configuration and
    /// `unsupported` for an unknown engine name.
    pub fn open(config_json: &str) -> EngineResult<Self> {
        let config = DbConfig::from_json(config_json)?;
        let backend: Arc<dyn Backend> = match config.engine.as_str() {
            "memory" => Arc::new(MemoryBackend::new()),
            other => {
                return Err(EngineError::unsupported(format!("engine {other:?}")));
            }
        };
        Self::with_backend(config, backend)
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> EngineResult<Self> {
        Self::open("")
    }

    /// Opens a database over a pre-built backend.
    ///
    /// This is the lower-level constructor for custom backends; most
    /// callers want [`Database::open`].
    pub fn with_backend(config: DbConfig, backend: Arc<dyn Backend>) -> EngineResult<Self> {
        let stats = Arc::new(DatabaseStats::new());
        tracing::debug!(engine = %config.engine, "database opened");
        Ok(Self {
            txns: TransactionManager::new(Arc::clone(&backend), Arc::clone(&stats)),
            backend,
            registry: CollectionRegistry::new(),
            stats,
            config,
            poison: RwLock::new(None),
        })
    }

    // ========================================================================
    // Batch data-plane
    // ========================================================================

    /// Writes a batch of values.
    ///
    /// Per task: a `None` value deletes the key, a present empty value
    /// stores an empty entry. With a transaction the writes are
    /// buffered (last write per key wins); without one the whole batch
    /// becomes visible atomically at a fresh commit point.
    /// [`Options::WRITE_FLUSH`] forces durability before return on the
    /// non-transactional path.
    ///
    /// # Errors
    ///
    /// Usage errors for malformed argument vectors; backend errors for
    /// failed application. A failed batch is never partially visible.
    pub fn write(
        &self,
        txn: Option<&mut Transaction>,
        batch: &WriteBatch<'_>,
        options: Options,
    ) -> EngineResult<()> {
        let result = self.write_inner(txn, batch, options);
        self.latch(result)
    }

    fn write_inner(
        &self,
        txn: Option<&mut Transaction>,
        batch: &WriteBatch<'_>,
        options: Options,
    ) -> EngineResult<()> {
        self.guard()?;
        options.ensure_allowed(Options::WRITE_FLUSH, "write")?;
        let tasks = decode_write(batch)?;
        for task in &tasks {
            match task.value {
                Some(value) => self.stats.record_write(value.len() as u64),
                None => self.stats.record_delete(),
            }
        }
        match txn {
            Some(txn) => {
                for task in tasks {
                    txn.buffer_write(task.collection, task.key, task.value.map(<[u8]>::to_vec))?;
                }
            }
            None => {
                let ops: Vec<WriteOp> = tasks
                    .into_iter()
                    .map(|task| WriteOp {
                        collection: task.collection,
                        key: task.key,
                        value: task.value.map(<[u8]>::to_vec),
                    })
                    .collect();
                self.txns
                    .commit_live(&ops, options.contains(Options::WRITE_FLUSH))?;
            }
        }
        Ok(())
    }

    /// Reads a batch of values into the arena tape.
    ///
    /// Missing keys are reported through the length header, never as an
    /// error. [`Options::READ_LENGTHS`] skips value bytes;
    /// [`Options::READ_TRACK`] records reads for commit-time conflict
    /// detection and requires a transaction. Transactional reads serve
    /// the write-set first, then the snapshot (if any), then the live
    /// store.
    ///
    /// # Errors
    ///
    /// Usage errors for malformed argument vectors or tracking without
    /// a transaction; backend errors otherwise.
    pub fn read<'a>(
        &self,
        txn: Option<&mut Transaction>,
        batch: &ReadBatch<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> EngineResult<ReadResult<'a>> {
        let result = self.read_inner(txn, batch, options, arena);
        self.latch(result)
    }

    fn read_inner<'a>(
        &self,
        mut txn: Option<&mut Transaction>,
        batch: &ReadBatch<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> EngineResult<ReadResult<'a>> {
        self.guard()?;
        options.ensure_allowed(Options::READ_LENGTHS | Options::READ_TRACK, "read")?;
        let track = options.contains(Options::READ_TRACK);
        if track && txn.is_none() {
            return Err(EngineError::usage("read_track requires a transaction"));
        }
        let tasks = decode_read(batch)?;
        let with_bytes = !options.contains(Options::READ_LENGTHS);

        // A multi-key read outside a transaction pins an ephemeral
        // snapshot so a concurrent batch cannot land between its point
        // lookups; observers see whole batches or nothing.
        let pin = if txn.is_none() && tasks.len() > 1 && self.backend.capabilities().snapshots {
            let point = self.backend.pin_snapshot()?;
            Some(SnapshotGuard::new(Arc::clone(&self.backend), point))
        } else {
            None
        };
        let at = pin.as_ref().map(SnapshotGuard::point);

        let mut builder = ValueTapeBuilder::new(arena, tasks.len(), with_bytes);
        for (collection, key) in tasks {
            let value = match &mut txn {
                Some(txn) => self.txns.read(txn, collection, key, track)?,
                None => self.backend.get(collection, key, at)?.value,
            };
            self.stats
                .record_read(value.as_ref().map_or(0, Vec::len) as u64);
            builder.push(value.as_deref());
        }
        Ok(builder.finish())
    }

    /// Scans key ranges: per task, up to `scan_length` present keys
    /// `>= min_key`, ascending, with value lengths when
    /// [`Options::READ_LENGTHS`] is set.
    ///
    /// Each task is an independent paginated range. Inside a
    /// transaction the write-set is merged in, so buffered inserts
    /// appear and buffered deletes vanish; a snapshot transaction scans
    /// its pinned point. Without a transaction, each call observes the
    /// store at one point between entry and return, with no promise of
    /// stability across calls.
    ///
    /// # Errors
    ///
    /// Usage errors for malformed argument vectors; backend errors
    /// otherwise.
    pub fn scan<'a>(
        &self,
        txn: Option<&Transaction>,
        batch: &ScanBatch<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> EngineResult<ScanResult<'a>> {
        let result = self.scan_inner(txn, batch, options, arena);
        self.latch(result)
    }

    fn scan_inner<'a>(
        &self,
        txn: Option<&Transaction>,
        batch: &ScanBatch<'_>,
        options: Options,
        arena: &'a mut Arena,
    ) -> EngineResult<ScanResult<'a>> {
        self.guard()?;
        options.ensure_allowed(Options::READ_LENGTHS, "scan")?;
        if let Some(txn) = txn {
            txn.ensure_active()?;
        }
        let tasks = decode_scan(batch)?;
        let with_lengths = options.contains(Options::READ_LENGTHS);

        let mut results: Vec<Vec<ScanEntry>> = Vec::with_capacity(tasks.len());
        for task in tasks {
            self.stats.record_scan();
            let at = txn.and_then(Transaction::snapshot_point);

            // Buffered deletes can knock entries out of the page, so
            // over-fetch by the number of deletes in range.
            let overrides = txn.map(|txn| buffered_in_range(txn, task.collection, task.min_key));
            let extra = overrides
                .as_ref()
                .map_or(0, |o| o.values().filter(|v| v.is_none()).count());

            let found = self.backend.scan_range(
                task.collection,
                task.min_key,
                task.limit.saturating_add(extra),
                at,
            )?;
            let merged = match overrides {
                Some(overrides) if !overrides.is_empty() => {
                    let mut page: BTreeMap<Key, ValueLen> = found.into_iter().collect();
                    for (key, len) in overrides {
                        match len {
                            Some(len) => {
                                page.insert(key, len);
                            }
                            None => {
                                page.remove(&key);
                            }
                        }
                    }
                    page.into_iter().take(task.limit).collect()
                }
                _ => {
                    let mut found = found;
                    found.truncate(task.limit);
                    found
                }
            };
            results.push(merged);
        }
        Ok(pack_scan(arena, &results, with_lengths))
    }

    /// Estimates cardinality and sizes for `[min, max]` key ranges.
    ///
    /// Returns six numbers per task as a [`SizeEstimate`]; the only
    /// promise is `min <= truth <= max`. Buffered transactional writes
    /// are not folded into estimates.
    ///
    /// # Errors
    ///
    /// Usage errors for malformed argument vectors; backend errors
    /// otherwise.
    pub fn size(
        &self,
        txn: Option<&Transaction>,
        batch: &SizeBatch<'_>,
        options: Options,
    ) -> EngineResult<Vec<SizeEstimate>> {
        let result = self.size_inner(txn, batch, options);
        self.latch(result)
    }

    fn size_inner(
        &self,
        txn: Option<&Transaction>,
        batch: &SizeBatch<'_>,
        options: Options,
    ) -> EngineResult<Vec<SizeEstimate>> {
        self.guard()?;
        options.ensure_allowed(Options::NONE, "size")?;
        if let Some(txn) = txn {
            txn.ensure_active()?;
        }
        let tasks = decode_size(batch)?;
        let mut estimates = Vec::with_capacity(tasks.len());
        for task in tasks {
            self.stats.record_size_estimate();
            estimates.push(self.backend.estimate_size(
                task.collection,
                task.min_key,
                task.max_key,
            )?);
        }
        Ok(estimates)
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Opens a named collection, creating it on first use.
    ///
    /// Opening an existing name returns its existing id; an empty name
    /// addresses the default collection. The `config` string is passed
    /// through for backend-specific collection tuning and is not
    /// interpreted by the engine.
    ///
    /// # Errors
    ///
    /// Usage error if the name contains a NUL byte (the list encoding
    /// reserves it).
    pub fn collection_open(&self, name: &str, _config: &str) -> EngineResult<CollectionId> {
        self.guard()?;
        if name.contains('\0') {
            return Err(EngineError::usage("collection names cannot contain NUL"));
        }
        Ok(self.registry.open(name))
    }

    /// Lists named collections as a NUL-delimited string in the arena.
    ///
    /// Returns the number of names and the packed string; each name is
    /// followed by one NUL. The default collection is not enumerated.
    pub fn collection_list<'a>(&self, arena: &'a mut Arena) -> EngineResult<(u64, &'a str)> {
        self.guard()?;
        let names = self.registry.names();
        let mut packed = String::new();
        for name in &names {
            packed.push_str(name);
            packed.push('\0');
        }
        Ok((names.len() as u64, arena.place_str(&packed)))
    }

    /// Removes a collection.
    ///
    /// `Some(name)` drops both the id and the contents of that
    /// collection; the id is never reused. `None` clears the default
    /// collection's contents while keeping its reserved id.
    ///
    /// # Errors
    ///
    /// `not_found` if the name is unknown.
    pub fn collection_remove(&self, name: Option<&str>) -> EngineResult<()> {
        let result = self.collection_remove_inner(name);
        self.latch(result)
    }

    fn collection_remove_inner(&self, name: Option<&str>) -> EngineResult<()> {
        self.guard()?;
        match name {
            None => self.backend.clear(Some(DEFAULT_COLLECTION))?,
            Some(name) => {
                let id = self.registry.remove(name)?;
                self.backend.clear(Some(id))?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begins a new transaction.
    ///
    /// `generation` stamps this incarnation: `0` asks the engine to
    /// assign one, any other value must be unique for the session.
    /// [`Options::TXN_SNAPSHOT`] pins a consistent read point for the
    /// transaction's lifetime.
    ///
    /// # Errors
    ///
    /// Usage error for a reused generation or stray option bits;
    /// `unsupported` if snapshots were requested and the backend has
    /// none.
    pub fn txn_begin(&self, generation: u64, options: Options) -> EngineResult<Transaction> {
        self.guard()?;
        self.txns.begin(generation, options)
    }

    /// Re-arms an existing handle for a new incarnation, whatever state
    /// it is in. Buffers are cleared and reused; any snapshot is
    /// released and, if requested again, re-pinned at the current
    /// point.
    ///
    /// # Errors
    ///
    /// Same as [`Database::txn_begin`].
    pub fn txn_restart(
        &self,
        txn: &mut Transaction,
        generation: u64,
        options: Options,
    ) -> EngineResult<()> {
        self.guard()?;
        self.txns.restart(txn, generation, options)
    }

    /// Commits a transaction.
    ///
    /// Validation and application happen atomically under the global
    /// commit order: if any tracked read was invalidated by a later
    /// commit, the transaction moves to `Conflicted`, its buffers stay
    /// inspectable, and nothing is applied. On success every buffered
    /// write becomes visible at the returned commit point.
    /// [`Options::WRITE_FLUSH`] forces durability before return.
    ///
    /// # Errors
    ///
    /// `conflict` when the OCC race is lost; usage error when the
    /// handle is not active.
    pub fn txn_commit(
        &self,
        txn: &mut Transaction,
        options: Options,
    ) -> EngineResult<CommitPoint> {
        let result = self.guard().and_then(|()| self.txns.commit(txn, options));
        self.latch(result)
    }

    // ========================================================================
    // Control and introspection
    // ========================================================================

    /// Executes a free-form control command and returns its response
    /// borrowed from the arena.
    ///
    /// Recognized commands: `clear`, `reset`, `compact`, `info`,
    /// `usage`.
    ///
    /// # Errors
    ///
    /// Usage error for unknown commands; backend errors otherwise.
    pub fn control<'a>(&self, request: &str, arena: &'a mut Arena) -> EngineResult<&'a str> {
        let result = self.control_inner(request, arena);
        self.latch(result)
    }

    fn control_inner<'a>(&self, request: &str, arena: &'a mut Arena) -> EngineResult<&'a str> {
        self.guard()?;
        let response = match ControlCommand::parse(request)? {
            ControlCommand::Clear => {
                self.backend.clear(None)?;
                "OK".to_string()
            }
            ControlCommand::Reset => {
                self.backend.clear(None)?;
                self.registry.reset();
                "OK".to_string()
            }
            ControlCommand::Compact => {
                self.backend.compact()?;
                "OK".to_string()
            }
            ControlCommand::Info => format!(
                "omnikv {} ({} backend)",
                env!("CARGO_PKG_VERSION"),
                self.config.engine
            ),
            ControlCommand::Usage => {
                let usage = self.backend.usage()?;
                format!(
                    "keys: {}; value_bytes: {}; ram: {}; disk: {}",
                    usage.keys, usage.value_bytes, usage.ram_bytes, usage.disk_bytes
                )
            }
        };
        tracing::debug!(request, "control command served");
        Ok(arena.place_str(&response))
    }

    /// Returns the engine operation counters.
    #[must_use]
    pub fn stats(&self) -> &DatabaseStats {
        &self.stats
    }

    /// The highest commit point made visible so far.
    #[must_use]
    pub fn committed_point(&self) -> CommitPoint {
        self.txns.committed_point()
    }

    /// Returns the open configuration.
    #[must_use]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Fails with the sticky corruption error, if one was observed.
    fn guard(&self) -> EngineResult<()> {
        match self.poison.read().as_ref() {
            Some(message) => Err(EngineError::corruption(message.clone())),
            None => Ok(()),
        }
    }

    /// Latches corruption: once a backend reports it, every later call
    /// on this handle reports it too.
    fn latch<T>(&self, result: EngineResult<T>) -> EngineResult<T> {
        if let Err(EngineError::Corruption { message }) = &result {
            let mut poison = self.poison.write();
            if poison.is_none() {
                tracing::warn!(message = %message, "database poisoned by corruption");
                *poison = Some(message.clone());
            }
        }
        result
    }
}

/// Buffered writes of `txn` in `collection` at or past `min_key`,
/// keyed for merging: `Some(len)` for puts, `None` for deletes.
fn buffered_in_range(
    txn: &Transaction,
    collection: CollectionId,
    min_key: Key,
) -> BTreeMap<Key, Option<ValueLen>> {
    txn.pending_writes()
        .filter(|(col, key, _)| *col == collection && *key >= min_key)
        .map(|(_, key, value)| (key, value.map(|v| v.len() as ValueLen)))
        .collect()
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("engine", &self.config.engine)
            .field("committed_point", &self.committed_point())
            .finish_non_exhaustive()
    }
}
