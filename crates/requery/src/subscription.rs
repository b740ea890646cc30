use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::caching::FetchError;
use crate::lock::lock;

/// Observable per-key query state.
///
/// Transitions are `Idle → Loading → {Success, Error}`; `Success` and
/// `Error` re-enter `Loading` on a refetch or a cache-miss re-entry, and
/// invalidation resets a key to `Idle`.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryState<V> {
    /// No cache entry and no fetch in flight.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The most recent fetch stored this value.
    Success(V),
    /// The most recent fetch failed. Previously cached data is untouched
    /// and stays readable.
    Error(FetchError),
}

pub(crate) type Callback<V> = Arc<dyn Fn(QueryState<V>) + Send + Sync>;

struct Listener<V> {
    id: u64,
    callback: Callback<V>,
}

/// Per-key observer lists used to push state transitions to interested
/// callers without polling.
///
/// Subscription lifetime and cache-entry lifetime are independent: a key
/// losing its last listener does not evict the cached value, and an
/// evicted value does not drop listeners.
pub(crate) struct SubscriberRegistry<K, V> {
    listeners: Mutex<FxHashMap<K, Vec<Listener<V>>>>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash, V> SubscriberRegistry<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&self, key: K, callback: Callback<V>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners, "subscribe")
            .entry(key)
            .or_default()
            .push(Listener { id, callback });
        id
    }

    pub(crate) fn remove(&self, key: &K, id: u64) {
        let mut listeners = lock(&self.listeners, "unsubscribe");
        if let Some(slot) = listeners.get_mut(key) {
            slot.retain(|listener| listener.id != id);
            // The key slot goes away with its last listener; the cache
            // entry for the key is not touched.
            if slot.is_empty() {
                listeners.remove(key);
            }
        }
    }
}

impl<K: Eq + Hash, V: Clone> SubscriberRegistry<K, V> {
    /// Fans `state` out to every listener of `key`.
    ///
    /// Callbacks run outside the registry lock, so a listener may
    /// subscribe or unsubscribe reentrantly.
    pub(crate) fn notify(&self, key: &K, state: QueryState<V>) {
        let callbacks: Vec<_> = {
            let listeners = lock(&self.listeners, "notify");
            match listeners.get(key) {
                Some(slot) => slot.iter().map(|l| Arc::clone(&l.callback)).collect(),
                None => return,
            }
        };

        tracing::trace!(listeners = callbacks.len(), "notifying query subscribers");
        for callback in callbacks {
            callback(state.clone());
        }
    }
}

/// Handle for an active subscription; dropping it unsubscribes.
pub struct Subscription<K: Eq + Hash, V> {
    registry: Arc<SubscriberRegistry<K, V>>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash, V> Subscription<K, V> {
    pub(crate) fn new(registry: Arc<SubscriberRegistry<K, V>>, key: K, id: u64) -> Self {
        Self { registry, key, id }
    }

    /// Stops notifications to this listener. The underlying fetch, and
    /// notifications to other listeners of the same key, are unaffected.
    pub fn unsubscribe(self) {}
}

impl<K: Eq + Hash, V> Drop for Subscription<K, V> {
    fn drop(&mut self) {
        self.registry.remove(&self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_unsubscribe_drops_the_key_slot() {
        let registry: SubscriberRegistry<&str, u32> = SubscriberRegistry::new();
        let a = registry.add("k", Arc::new(|_| {}));
        let b = registry.add("k", Arc::new(|_| {}));

        registry.remove(&"k", a);
        assert!(lock(&registry.listeners, "test").contains_key(&"k"));
        registry.remove(&"k", b);
        assert!(!lock(&registry.listeners, "test").contains_key(&"k"));
    }

    #[test]
    fn test_notify_reaches_all_listeners_of_a_key() {
        let registry: SubscriberRegistry<&str, u32> = SubscriberRegistry::new();
        let seen = Arc::new(AtomicU64::new(0));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            registry.add(
                "k",
                Arc::new(move |state| {
                    assert_eq!(state, QueryState::Success(7));
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        registry.add("other", Arc::new(|_| panic!("wrong key notified")));

        registry.notify(&"k", QueryState::Success(7));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
