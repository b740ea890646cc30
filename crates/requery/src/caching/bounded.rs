use std::collections::VecDeque;
use std::hash::Hash;
use std::time::Duration;

use rustc_hash::FxHashMap;

use super::store::CacheStore;

/// A fixed-capacity key/value store with insertion-order eviction.
///
/// When a new key is inserted at capacity, the single oldest-*inserted*
/// entry is evicted. Unlike [`LruCache`](super::LruCache), reads never
/// reorder anything, and overwriting an existing key keeps its original
/// insertion-order position.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: FxHashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be non-zero");
        Self {
            capacity,
            entries: FxHashMap::default(),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Inserts or overwrites.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(slot) = self.entries.get_mut(&key) {
            // Overwrites keep the original insertion-order position.
            *slot = value;
            return;
        }
        if self.entries.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                metric!(counter("caches.eviction") += 1, "cache" => "bounded");
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    /// Pure lookup; no side effects on ordering.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn has(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> CacheStore<K, V> for BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    fn lookup(&mut self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn peek(&self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn insert(&mut self, key: K, value: V, _ttl: Option<Duration>) {
        self.set(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.delete(key)
    }

    fn clear(&mut self) {
        self.clear();
    }

    fn len(&self) -> usize {
        self.len()
    }
}
