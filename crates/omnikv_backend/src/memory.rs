//! In-memory backend with per-key version chains.

use crate::backend::{
    Backend, BackendUsage, Capabilities, Lookup, ScanEntry, SizeEstimate, WriteOp,
};
use crate::error::{BackendError, BackendResult};
use crate::types::{CollectionId, CommitPoint, Key, ValueLen};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// One committed state of a key.
#[derive(Debug, Clone)]
struct Version {
    point: CommitPoint,
    /// `None` is a tombstone left by a delete.
    value: Option<Vec<u8>>,
}

/// An in-memory storage backend.
///
/// Every key carries a chain of versions ordered by commit point. Reads
/// pinned to a snapshot point resolve against the chain; unpinned chains
/// are pruned down to their newest version as batches are applied.
///
/// Suitable for tests, ephemeral stores and as the reference
/// implementation of the [`Backend`] contract.
///
/// # Thread Safety
///
/// The whole store sits behind a single reader-writer lock, which also
/// provides batch atomicity: a reader either runs before an `apply` or
/// after it, never in between.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Store>,
}

#[derive(Debug, Default)]
struct Store {
    entries: BTreeMap<(CollectionId, Key), Vec<Version>>,
    /// Pinned snapshot point -> pin count.
    pinned: BTreeMap<CommitPoint, usize>,
    last_applied: CommitPoint,
}

impl Store {
    /// Oldest point any pinned snapshot still needs.
    fn min_pinned(&self) -> Option<CommitPoint> {
        self.pinned.keys().next().copied()
    }

    /// Drops versions no snapshot can observe, keeping the newest one
    /// visible at `keep_from` and everything after it.
    fn prune_chain(chain: &mut Vec<Version>, keep_from: Option<CommitPoint>) {
        let cut = match keep_from {
            Some(point) => chain
                .iter()
                .rposition(|v| v.point <= point)
                .unwrap_or(0),
            None => chain.len().saturating_sub(1),
        };
        chain.drain(..cut);
    }

    fn resolve(chain: &[Version], at: Option<CommitPoint>) -> Lookup {
        let visible = match at {
            Some(point) => chain.iter().rev().find(|v| v.point <= point),
            None => chain.last(),
        };
        match visible {
            Some(v) => Lookup {
                value: v.value.clone(),
                point: v.point,
            },
            None => Lookup::default(),
        }
    }
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live (non-tombstone) keys. Test helper.
    #[must_use]
    pub fn live_keys(&self) -> usize {
        let store = self.inner.read();
        store
            .entries
            .values()
            .filter(|chain| matches!(chain.last(), Some(v) if v.value.is_some()))
            .count()
    }
}

impl Backend for MemoryBackend {
    fn get(
        &self,
        collection: CollectionId,
        key: Key,
        at: Option<CommitPoint>,
    ) -> BackendResult<Lookup> {
        let store = self.inner.read();
        Ok(store
            .entries
            .get(&(collection, key))
            .map(|chain| Store::resolve(chain, at))
            .unwrap_or_default())
    }

    fn apply(&self, point: CommitPoint, ops: &[WriteOp], _flush: bool) -> BackendResult<()> {
        let mut store = self.inner.write();
        if point <= store.last_applied {
            return Err(BackendError::corrupted(format!(
                "commit point {point} not after {}",
                store.last_applied
            )));
        }
        let keep_from = store.min_pinned();
        for op in ops {
            let chain = store
                .entries
                .entry((op.collection, op.key))
                .or_default();
            chain.push(Version {
                point,
                value: op.value.clone(),
            });
            Store::prune_chain(chain, keep_from);
        }
        store.last_applied = point;
        Ok(())
    }

    fn scan_range(
        &self,
        collection: CollectionId,
        min_key: Key,
        limit: usize,
        at: Option<CommitPoint>,
    ) -> BackendResult<Vec<ScanEntry>> {
        let store = self.inner.read();
        let mut found = Vec::with_capacity(limit.min(64));
        for ((_, key), chain) in store
            .entries
            .range((collection, min_key)..=(collection, Key::MAX))
        {
            if found.len() == limit {
                break;
            }
            if let Some(value) = Store::resolve(chain, at).value {
                found.push((*key, value.len() as ValueLen));
            }
        }
        Ok(found)
    }

    fn estimate_size(
        &self,
        collection: CollectionId,
        min_key: Key,
        max_key: Key,
    ) -> BackendResult<SizeEstimate> {
        if min_key > max_key {
            return Ok(SizeEstimate::default());
        }
        let store = self.inner.read();
        let mut count = 0u64;
        let mut bytes = 0u64;
        for (_, chain) in store
            .entries
            .range((collection, min_key)..=(collection, max_key))
        {
            if let Some(value) = chain.last().and_then(|v| v.value.as_ref()) {
                count += 1;
                bytes += value.len() as u64;
            }
        }
        // Exact counts are valid bounds; space gets a per-entry overhead
        // allowance for the chain bookkeeping.
        Ok(SizeEstimate {
            cardinality: (count, count),
            value_bytes: (bytes, bytes),
            space_usage: (bytes, bytes + count * ENTRY_OVERHEAD),
        })
    }

    fn pin_snapshot(&self) -> BackendResult<CommitPoint> {
        let mut store = self.inner.write();
        let point = store.last_applied;
        *store.pinned.entry(point).or_insert(0) += 1;
        Ok(point)
    }

    fn release_snapshot(&self, point: CommitPoint) -> BackendResult<()> {
        let mut store = self.inner.write();
        match store.pinned.get_mut(&point) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(())
            }
            Some(_) => {
                store.pinned.remove(&point);
                Ok(())
            }
            None => Err(BackendError::UnknownSnapshot(point)),
        }
    }

    fn clear(&self, collection: Option<CollectionId>) -> BackendResult<()> {
        let mut store = self.inner.write();
        match collection {
            Some(col) => store.entries.retain(|(c, _), _| *c != col),
            None => store.entries.clear(),
        }
        Ok(())
    }

    fn compact(&self) -> BackendResult<()> {
        let mut store = self.inner.write();
        let keep_from = store.min_pinned();
        store.entries.retain(|_, chain| {
            Store::prune_chain(chain, keep_from);
            // A lone tombstone nobody can observe is garbage.
            !(chain.len() == 1 && keep_from.is_none() && chain[0].value.is_none())
        });
        Ok(())
    }

    fn usage(&self) -> BackendResult<BackendUsage> {
        let store = self.inner.read();
        let mut usage = BackendUsage::default();
        for chain in store.entries.values() {
            if let Some(v) = chain.last() {
                if let Some(value) = &v.value {
                    usage.keys += 1;
                    usage.value_bytes += value.len() as u64;
                }
            }
            let chain_bytes: u64 = chain
                .iter()
                .map(|v| v.value.as_ref().map_or(0, Vec::len) as u64 + ENTRY_OVERHEAD)
                .sum();
            usage.ram_bytes += chain_bytes;
        }
        Ok(usage)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { snapshots: true }
    }
}

/// Rough per-version bookkeeping cost used in estimates.
const ENTRY_OVERHEAD: u64 = 64;
