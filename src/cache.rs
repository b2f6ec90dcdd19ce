//! Time-bounded read cache.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::observability::metrics;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// A thread-safe cache whose entries expire after a fixed TTL.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    name: &'static str,
    inner: Arc<DashMap<K, CacheEntry<V>>>,
    /// Bumped by every invalidation of a key.
    epochs: Arc<DashMap<K, u64>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            inner: Arc::new(DashMap::new()),
            epochs: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Get a fresh value; stale entries count as misses and are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self
            .inner
            .get(key)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.value.clone());

        match hit {
            Some(value) => {
                metrics::record_cache_lookup(self.name, true);
                Some(value)
            }
            None => {
                self.inner
                    .remove_if(key, |_, e| e.inserted_at.elapsed() >= self.ttl);
                metrics::record_cache_lookup(self.name, false);
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn epoch(&self, key: &K) -> u64 {
        self.epochs.get(key).map_or(0, |e| *e)
    }

    /// Return the cached value or compute and store it.
    ///
    /// A value computed while the key was invalidated is returned but not
    /// stored.
    pub fn get_or_insert_with<E>(&self, key: K, f: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let before = self.epoch(&key);
        let value = f()?;

        // Lock order is epochs then inner, same as `invalidate`.
        let epoch = self.epochs.entry(key.clone()).or_insert(0);
        if *epoch == before {
            self.insert(key, value.clone());
        }
        drop(epoch);
        Ok(value)
    }

    pub fn invalidate(&self, key: &K) {
        let mut epoch = self.epochs.entry(key.clone()).or_insert(0);
        *epoch += 1;
        self.inner.remove(key);
        drop(epoch);
    }

    pub fn clear(&self) {
        for mut epoch in self.epochs.iter_mut() {
            *epoch += 1;
        }
        self.inner.clear();
    }

    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        let ttl = self.ttl;
        self.inner.retain(|_, e| e.inserted_at.elapsed() < ttl);
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_operations() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        assert!(cache.get(&"a").is_none());

        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        cache.invalidate(&"a");
        assert!(cache.get(&"a").is_none());
    }

    #[test]
    fn test_zero_ttl_never_hits() {
        let cache = TtlCache::new("test", Duration::ZERO);
        cache.insert("a", 1);
        assert!(cache.get(&"a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        let mut calls = 0;
        for _ in 0..3 {
            let v: Result<i32, ()> = cache.get_or_insert_with("k", || {
                calls += 1;
                Ok(7)
            });
            assert_eq!(v, Ok(7));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_value_invalidated_during_compute_is_not_stored() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        let v: Result<i32, ()> = cache.get_or_insert_with("k", || {
            // A writer invalidates while the value is being built.
            cache.invalidate(&"k");
            Ok(1)
        });
        assert_eq!(v, Ok(1));
        assert!(cache.get(&"k").is_none());

        let v: Result<i32, ()> = cache.get_or_insert_with("k", || Ok(2));
        assert_eq!(v, Ok(2));
        assert_eq!(cache.get(&"k"), Some(2));
    }

    #[test]
    fn test_purge_expired() {
        let cache = TtlCache::new("test", Duration::from_millis(1));
        cache.insert(1, "x");
        cache.insert(2, "y");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 2);
    }
}
