//! Collection registry: named key spaces and their ids.

use crate::error::{EngineError, EngineResult};
use crate::types::{CollectionId, DEFAULT_COLLECTION};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Registry of named collections.
///
/// Names map to stable 64-bit ids handed out from a monotonic counter;
/// ids are never reused within a session, so a handle to a removed
/// collection can never silently address a newer one. Id `0` is the
/// anonymous default collection, which always exists, is not listed and
/// cannot be removed.
#[derive(Debug)]
pub(crate) struct CollectionRegistry {
    inner: RwLock<Registry>,
}

#[derive(Debug)]
struct Registry {
    names: BTreeMap<String, CollectionId>,
    next_id: u64,
}

impl CollectionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Registry {
                names: BTreeMap::new(),
                next_id: DEFAULT_COLLECTION.as_u64() + 1,
            }),
        }
    }

    /// Opens a named collection, creating it on first use. An empty name
    /// addresses the default collection.
    pub(crate) fn open(&self, name: &str) -> CollectionId {
        if name.is_empty() {
            return DEFAULT_COLLECTION;
        }
        let mut registry = self.inner.write();
        if let Some(&id) = registry.names.get(name) {
            return id;
        }
        let id = CollectionId::new(registry.next_id);
        registry.next_id += 1;
        registry.names.insert(name.to_string(), id);
        id
    }

    /// Removes a named collection, returning its now-dead id.
    pub(crate) fn remove(&self, name: &str) -> EngineResult<CollectionId> {
        let mut registry = self.inner.write();
        registry
            .names
            .remove(name)
            .ok_or_else(|| EngineError::collection_not_found(name))
    }

    /// Names of all collections, sorted. The default is not listed.
    pub(crate) fn names(&self) -> Vec<String> {
        self.inner.read().names.keys().cloned().collect()
    }

    /// Ids of all named collections.
    pub(crate) fn ids(&self) -> Vec<CollectionId> {
        self.inner.read().names.values().copied().collect()
    }

    /// Drops every name. Ids keep advancing, so removed ids stay dead.
    pub(crate) fn reset(&self) {
        self.inner.write().names.clear();
    }
}
