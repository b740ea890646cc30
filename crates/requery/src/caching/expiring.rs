use std::hash::Hash;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::time::Instant;

use super::store::CacheStore;

/// A key/value store where every entry carries its own absolute expiry.
///
/// Expired entries are evicted lazily by the read that discovers them;
/// [`cleanup`](Self::cleanup) additionally sweeps entries nobody reads
/// again. Reading never extends an entry's lifetime; the TTL is fixed at
/// [`set`](Self::set) time.
#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    entries: FxHashMap<K, Entry<V>>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

impl<K: Eq + Hash, V> ExpiringCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Stores `value`, eligible to be returned for `ttl` from now.
    ///
    /// A zero `ttl` stores an entry that can never be read back.
    pub fn set(&mut self, key: K, value: V, ttl: Duration) {
        self.insert_entry(key, value, Some(Instant::now() + ttl));
    }

    /// Stores `value` without an expiry.
    pub fn set_forever(&mut self, key: K, value: V) {
        self.insert_entry(key, value, None);
    }

    fn insert_entry(&mut self, key: K, value: V, expires_at: Option<Instant>) {
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Looks `key` up. Discovering an expired entry deletes it and reports
    /// a miss; a hit does NOT extend the entry's expiry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            metric!(counter("caches.expired") += 1, "cache" => "expiring");
            return None;
        }
        self.entries.get(key).map(|e| &e.value)
    }

    /// Consistent with [`get`](Self::get)'s freshness rule, but never
    /// mutates: an expired-but-not-yet-deleted entry reports `false`.
    pub fn has(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Sweeps every currently-expired entry.
    ///
    /// Intended to be invoked periodically by an external scheduler so
    /// memory is reclaimed even for keys nobody reads again. Lazy eviction
    /// on `get` keeps reads correct whether or not this ever runs.
    pub fn cleanup(&mut self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));

        let swept = before - self.entries.len();
        if swept > 0 {
            tracing::trace!(swept, "swept expired cache entries");
            metric!(counter("caches.expired") += swept as i64, "cache" => "expiring");
        }
    }

    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V> Default for ExpiringCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheStore<K, V> for ExpiringCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn lookup(&mut self, key: &K) -> Option<V> {
        self.get(key).cloned()
    }

    fn peek(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    fn insert(&mut self, key: K, value: V, ttl: Option<Duration>) {
        self.insert_entry(key, value, ttl.map(|ttl| Instant::now() + ttl));
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

    fn evict_expired(&mut self) {
        self.cleanup();
    }
}
