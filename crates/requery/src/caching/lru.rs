use std::collections::BTreeMap;
use std::hash::Hash;
use std::time::Duration;

use rustc_hash::FxHashMap;

use super::store::CacheStore;

/// A fixed-capacity store that evicts the least-recently-*accessed* entry.
///
/// Recency is tracked with a monotonic sequence number per entry: `get`
/// hits and `set` calls bump an entry to most-recently-used,
/// [`has`](Self::has) never does. Entries written in the same logical tick
/// evict in the order the `set` calls were issued.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: FxHashMap<K, Slot<V>>,
    by_recency: BTreeMap<u64, K>,
    clock: u64,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    seq: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
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
            by_recency: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Inserts or overwrites; either way `key` becomes most-recently-used.
    /// Inserting a new key at capacity evicts the least-recently-used
    /// entry first.
    pub fn set(&mut self, key: K, value: V) {
        self.clock += 1;
        let seq = self.clock;

        if let Some(slot) = self.entries.get_mut(&key) {
            self.by_recency.remove(&slot.seq);
            self.by_recency.insert(seq, key);
            slot.value = value;
            slot.seq = seq;
            return;
        }

        if self.entries.len() == self.capacity {
            if let Some((_, lru)) = self.by_recency.pop_first() {
                self.entries.remove(&lru);
                metric!(counter("caches.eviction") += 1, "cache" => "lru");
            }
        }
        self.by_recency.insert(seq, key.clone());
        self.entries.insert(key, Slot { value, seq });
    }

    /// A hit marks `key` as most-recently-used before the value is
    /// returned. A miss has no side effect.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.clock += 1;
        let seq = self.clock;

        let slot = self
            .entries
            .get_mut(key)
            .expect("presence checked above");
        self.by_recency.remove(&slot.seq);
        self.by_recency.insert(seq, key.clone());
        slot.seq = seq;
        Some(&slot.value)
    }

    /// Read-only membership probe; never alters recency order.
    pub fn has(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.by_recency.remove(&slot.seq);
        Some(slot.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_recency.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> CacheStore<K, V> for LruCache<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Clone + Send,
{
    fn lookup(&mut self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn peek(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|slot| slot.value.clone())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_eviction() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        // Touching `a` makes `b` the eviction candidate.
        assert_eq!(cache.get(&"a"), Some(&1));
        cache.set("c", 3);

        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_has_does_not_alter_recency() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        // `has` is not an access; `a` stays least-recently-used.
        assert!(cache.has(&"a"));
        cache.set("c", 3);

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
    }

    #[test]
    fn test_overwrite_marks_most_recently_used() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        cache.set("c", 3);

        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn test_eviction_follows_set_issue_order() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        cache.set("d", 4);

        // `a` then `b` were evicted in the order their sets were issued.
        assert!(!cache.has(&"a"));
        assert!(!cache.has(&"b"));
        assert!(cache.has(&"c"));
        assert!(cache.has(&"d"));
    }

    #[test]
    fn test_capacity_invariant() {
        let mut cache = LruCache::new(4);
        for i in 0..100 {
            cache.set(i % 11, i);
            assert!(cache.len() <= 4);
        }
    }

    #[test]
    fn test_capacity_one_end_to_end() {
        let mut cache = LruCache::new(1);
        cache.set("x", 1);
        cache.set("y", 2);

        assert_eq!(cache.get(&"x"), None);
        assert_eq!(cache.get(&"y"), Some(&2));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cache = LruCache::new(2);
        cache.set("a", 1);
        cache.clear();
        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = LruCache::<&str, u32>::new(0);
    }
}
