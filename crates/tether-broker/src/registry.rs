//! Registries of long-lived registrations
//!
//! Whichever side hosts the real implementation owns the registry. Ids are
//! minted from a per-registry counter as `<prefix>:<n>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Id-minting map from registration ids to their teardown state.
pub struct Registry<V> {
    prefix: &'static str,
    seq: AtomicU64,
    entries: Mutex<HashMap<String, V>>,
}

impl<V> Registry<V> {
    /// An empty registry minting `<prefix>:<n>` ids.
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            seq: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mint a fresh id without registering anything under it.
    pub fn mint(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}:{}", self.prefix, n)
    }

    /// Register `value` under a fresh id.
    pub fn register(&self, value: V) -> String {
        let id = self.mint();
        self.entries().insert(id.clone(), value);
        id
    }

    /// Register `value` under an id chosen elsewhere.
    pub fn insert(&self, id: impl Into<String>, value: V) -> Option<V> {
        self.entries().insert(id.into(), value)
    }

    /// Take an entry out, `None` if the id is unknown or already removed.
    pub fn remove(&self, id: &str) -> Option<V> {
        self.entries().remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Remove every entry, returning `(id, entry)` pairs.
    pub fn drain(&self) -> Vec<(String, V)> {
        self.entries().drain().collect()
    }
}

impl<V: Clone> Registry<V> {
    pub fn get(&self, id: &str) -> Option<V> {
        self.entries().get(id).cloned()
    }

    /// Snapshot of every entry, for fan-out outside the lock.
    pub fn values(&self) -> Vec<V> {
        self.entries().values().cloned().collect()
    }

    /// Snapshot of every `(id, entry)` pair.
    pub fn entries_snapshot(&self) -> Vec<(String, V)> {
        self.entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<V> std::fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("prefix", &self.prefix)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_prefixed_and_unique() {
        let registry = Registry::new("sub");
        let a = registry.register(1);
        let b = registry.register(2);
        assert_eq!(a, "sub:1");
        assert_eq!(b, "sub:2");
        assert_eq!(registry.get(&b), Some(2));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new("intercept");
        let id = registry.register("x");
        assert_eq!(registry.remove(&id), Some("x"));
        assert_eq!(registry.remove(&id), None);
        assert!(registry.is_empty());
    }
}
