use std::time::Duration;

/// The storage seam between the
/// [`QueryCoordinator`](crate::QueryCoordinator) and a cache.
///
/// Implemented by all three cache primitives for cloneable values, so the
/// backing eviction policy can be chosen per coordinator instance.
pub trait CacheStore<K, V>: Send {
    /// Looks `key` up, applying the cache's own read side effects: an LRU
    /// hit becomes most-recently-used, an expired TTL entry is deleted and
    /// reported as a miss.
    fn lookup(&mut self, key: &K) -> Option<V>;

    /// Read-only probe: no recency update, no lazy eviction. Must not
    /// return values `lookup` would refuse (e.g. expired entries).
    fn peek(&self, key: &K) -> Option<V>;

    /// Inserts or overwrites, evicting per the cache's policy if needed.
    ///
    /// `ttl` only has meaning for time-based caches; the others ignore it.
    fn insert(&mut self, key: K, value: V, ttl: Option<Duration>);

    /// Removes the entry for `key`, returning it if present.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Removes every entry.
    fn clear(&mut self);

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Whether the store holds no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps entries that are past their expiry. A no-op for caches
    /// without a time dimension.
    fn evict_expired(&mut self) {}
}
