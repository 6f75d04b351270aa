//! Memoizing map for metadata that never changes within a session.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Insert-once map from string keys to shared values.
///
/// Entries never expire. Two concurrent misses on the same key may both
/// fetch; the later insert wins, which is harmless because the fetched
/// metadata is identical.
pub(crate) struct MemoCache<V> {
    store: RwLock<HashMap<String, Arc<V>>>,
}

impl<V> MemoCache<V> {
    pub(crate) fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Get a cached entry by key.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<V>> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store.get(key).cloned()
    }

    /// Store an entry and return the shared handle.
    pub(crate) fn insert(&self, key: &str, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.insert(key.to_string(), value.clone());
        value
    }

    /// Drop an entry so the next lookup refetches it.
    pub(crate) fn remove(&self, key: &str) {
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        store.remove(key);
    }

    /// Get the current number of entries.
    pub(crate) fn len(&self) -> usize {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Keys currently cached.
    pub(crate) fn keys(&self) -> Vec<String> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = store.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<V> Default for MemoCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
