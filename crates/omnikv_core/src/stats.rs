//! Engine statistics and telemetry.
//!
//! Counters feed the `usage` control command and are readable at any
//! time through [`crate::Database::stats`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine operation counters.
///
/// All counters are atomic and monotonically increasing; reading them
/// while operations are in flight is safe.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    size_estimates: AtomicU64,
    txns_begun: AtomicU64,
    txns_committed: AtomicU64,
    txns_conflicted: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl DatabaseStats {
    /// Creates a zeroed stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_size_estimate(&self) {
        self.size_estimates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txn_begin(&self) {
        self.txns_begun.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txn_commit(&self) {
        self.txns_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_txn_conflict(&self) {
        self.txns_conflicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Total point reads served.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total puts applied or buffered.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total deletes applied or buffered.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Total scan tasks served.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Total size-estimation tasks served.
    pub fn size_estimates(&self) -> u64 {
        self.size_estimates.load(Ordering::Relaxed)
    }

    /// Total transactions begun (including handle reuse).
    pub fn txns_begun(&self) -> u64 {
        self.txns_begun.load(Ordering::Relaxed)
    }

    /// Total transactions committed.
    pub fn txns_committed(&self) -> u64 {
        self.txns_committed.load(Ordering::Relaxed)
    }

    /// Total commits lost to a conflict.
    pub fn txns_conflicted(&self) -> u64 {
        self.txns_conflicted.load(Ordering::Relaxed)
    }

    /// Total value bytes returned to readers.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Total value bytes accepted from writers.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            scans: self.scans(),
            size_estimates: self.size_estimates(),
            txns_begun: self.txns_begun(),
            txns_committed: self.txns_committed(),
            txns_conflicted: self.txns_conflicted(),
            bytes_read: self.bytes_read(),
            bytes_written: self.bytes_written(),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`], free of atomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Total point reads served.
    pub reads: u64,
    /// Total puts applied or buffered.
    pub writes: u64,
    /// Total deletes applied or buffered.
    pub deletes: u64,
    /// Total scan tasks served.
    pub scans: u64,
    /// Total size-estimation tasks served.
    pub size_estimates: u64,
    /// Total transactions begun.
    pub txns_begun: u64,
    /// Total transactions committed.
    pub txns_committed: u64,
    /// Total commits lost to a conflict.
    pub txns_conflicted: u64,
    /// Total value bytes returned to readers.
    pub bytes_read: u64,
    /// Total value bytes accepted from writers.
    pub bytes_written: u64,
}
