//! Concurrent memoization maps backing the registries.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{PoisonError, RwLock};

/// A map that stores at most one value per key.
///
/// Racing callers may both compute a value for a missing key, but only the
/// first insert is stored and every caller observes that winner afterwards.
#[derive(Debug)]
pub(crate) struct MemoCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> MemoCache<K, V> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stores `value` unless the key is already present; returns the stored value.
    pub(crate) fn insert_if_absent(&self, key: K, value: V) -> V {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(value)
            .clone()
    }

    pub(crate) fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(found) = self.get(&key) {
            return found;
        }
        self.insert_if_absent(key, compute())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_insert_wins() {
        let cache: MemoCache<&str, Arc<i32>> = MemoCache::new();
        let first = cache.insert_if_absent("a", Arc::new(1));
        let second = cache.insert_if_absent("a", Arc::new(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*cache.get(&"a").unwrap(), 1);
    }

    #[test]
    fn test_compute_runs_only_on_miss() {
        let cache: MemoCache<u8, u8> = MemoCache::new();
        assert_eq!(cache.get_or_insert_with(1, || 10), 10);
        assert_eq!(cache.get_or_insert_with(1, || panic!("recomputed")), 10);
    }

    #[test]
    fn test_concurrent_population_converges() {
        let cache: Arc<MemoCache<u8, Arc<usize>>> = Arc::new(MemoCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_insert_with(7, || Arc::new(i)))
            })
            .collect();
        let results: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn test_clear() {
        let cache: MemoCache<u8, u8> = MemoCache::new();
        cache.insert_if_absent(1, 1);
        cache.clear();
        assert!(cache.get(&1).is_none());
    }
}
