use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use rustc_hash::FxHashMap;

use crate::caching::{
    BoundedCache, CacheStore, ExpiringCache, FetchError, LruCache, QueryResult,
};
use crate::config::{CachePolicy, CacheSettings, QueryOptions};
use crate::lock::lock;
use crate::subscription::{Callback, QueryState, SubscriberRegistry, Subscription};
use crate::time::Instant;

/// A value in the backing store, tagged with when it was stored so fresh
/// hits can be told apart from stale ones. Staleness is layered on top of
/// the store here; the store's own TTL only decides presence.
#[derive(Clone, Debug)]
struct StoredValue<V> {
    value: V,
    stored_at: Instant,
}

type Store<K, V> = Box<dyn CacheStore<K, StoredValue<V>>>;
type SharedFetch<V> = Shared<BoxFuture<'static, QueryResult<V>>>;

/// Ties a fetch operation to a cache: returns cached data while it is
/// fresh, otherwise triggers at most one concurrent fetch per key, stores
/// the result, and notifies subscribers.
///
/// The deduplication guarantee: for N concurrent [`query`](Self::query)
/// calls on the same key while a fetch is outstanding, the fetcher is
/// invoked exactly once, and all N callers observe the same eventual
/// result. A stale-but-present hit is returned immediately and refreshed
/// in the background (stale-while-revalidate); the refresh goes through
/// the same deduplicated path.
///
/// Failed fetches are surfaced to callers and subscribers but never evict
/// previously cached data, and nothing is retried automatically; retry
/// policy belongs to the fetcher.
///
/// The coordinator is cheap to clone; clones share the cache, the
/// pending-fetch registry and the subscriber lists.
pub struct QueryCoordinator<K, V> {
    store: Arc<Mutex<Store<K, V>>>,
    pending: Arc<Mutex<FxHashMap<K, SharedFetch<V>>>>,
    subscribers: Arc<SubscriberRegistry<K, V>>,
}

impl<K, V> Clone for QueryCoordinator<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pending: Arc::clone(&self.pending),
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<K, V> fmt::Debug for QueryCoordinator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.store.try_lock().map(|s| s.len()).unwrap_or_default();
        let in_flight = self
            .pending
            .try_lock()
            .map(|p| p.len())
            .unwrap_or_default();
        f.debug_struct("QueryCoordinator")
            .field("cached entries", &cached)
            .field("in-flight fetches", &in_flight)
            .finish()
    }
}

/// Removes a key's pending-fetch entry when dropped, so the registry is
/// cleared however the fetch settles, including when the future is dropped
/// mid-flight.
struct PendingGuard<K: Eq + Hash, V> {
    pending: Arc<Mutex<FxHashMap<K, SharedFetch<V>>>>,
    key: K,
}

impl<K: Eq + Hash, V> Drop for PendingGuard<K, V> {
    fn drop(&mut self) {
        lock(&self.pending, "pending_guard").remove(&self.key);
    }
}

impl<K, V> QueryCoordinator<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a coordinator over an unbounded TTL cache. This is the
    /// backing to use when queries carry a `ttl`.
    pub fn expiring() -> Self {
        Self::with_store(Box::new(ExpiringCache::new()))
    }

    /// Creates a coordinator over an LRU cache of `capacity` entries, for
    /// simple memoization with a recency bound.
    pub fn lru(capacity: usize) -> Self {
        Self::with_store(Box::new(LruCache::new(capacity)))
    }

    /// Creates a coordinator over an insertion-order bounded cache of
    /// `capacity` entries.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_store(Box::new(BoundedCache::new(capacity)))
    }

    /// Composition-root constructor: selects the backing policy from
    /// configuration.
    pub fn from_config(settings: &CacheSettings) -> Self {
        match settings.policy {
            CachePolicy::Expiring => Self::expiring(),
            CachePolicy::Lru => Self::lru(settings.capacity()),
            CachePolicy::Bounded => Self::bounded(settings.capacity()),
        }
    }

    fn with_store(store: Store<K, V>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            pending: Arc::new(Mutex::new(FxHashMap::default())),
            subscribers: Arc::new(SubscriberRegistry::new()),
        }
    }

    /// Resolves `key`, from cache when possible.
    ///
    /// - A value younger than `options.stale_time` is returned with no
    ///   fetch activity.
    /// - A stale-but-present value is returned immediately and a
    ///   deduplicated background refresh is spawned.
    /// - A miss coalesces on the pending-fetch registry: either attaching
    ///   to the in-flight fetch for `key`, or registering one, notifying
    ///   subscribers with [`QueryState::Loading`] and invoking `fetcher`.
    ///
    /// With `options.enabled == false` nothing is consulted and
    /// [`FetchError::Disabled`] is returned; the key stays `Idle`.
    pub async fn query<F, Fut>(&self, key: K, fetcher: F, options: QueryOptions) -> QueryResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<V>> + Send + 'static,
    {
        if !options.enabled {
            return Err(FetchError::Disabled);
        }
        metric!(counter("queries.access") += 1);

        if let Some(stored) = lock(&self.store, "query").lookup(&key) {
            if stored.stored_at.elapsed() < options.stale_time {
                metric!(counter("queries.hit.fresh") += 1);
                return Ok(stored.value);
            }
            // Stale-while-revalidate: serve the cached value right away,
            // refresh it in the background.
            metric!(counter("queries.hit.stale") += 1);
            self.spawn_refresh(key, fetcher, options);
            return Ok(stored.value);
        }

        metric!(counter("queries.miss") += 1);
        self.fetch_deduplicated(key, fetcher, options).await
    }

    /// Forces a refresh through the deduplicated fetch path, bypassing the
    /// freshness check. The cached value stays readable until the refresh
    /// settles, and survives it if the refresh fails.
    pub async fn refetch<F, Fut>(&self, key: K, fetcher: F, options: QueryOptions) -> QueryResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<V>> + Send + 'static,
    {
        if !options.enabled {
            return Err(FetchError::Disabled);
        }
        self.fetch_deduplicated(key, fetcher, options).await
    }

    fn spawn_refresh<F, Fut>(&self, key: K, fetcher: F, options: QueryOptions)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<V>> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            // A failed refresh leaves the cached value in place; the error
            // has already been fanned out to subscribers.
            let _ = this.fetch_deduplicated(key, fetcher, options).await;
        });
    }

    /// Coalesces concurrent fetches for `key`: the first caller registers
    /// the fetch and transitions the key to `Loading`, everyone else
    /// attaches to the same shared future.
    async fn fetch_deduplicated<F, Fut>(
        &self,
        key: K,
        fetcher: F,
        options: QueryOptions,
    ) -> QueryResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<V>> + Send + 'static,
    {
        let (fetch, is_owner) = {
            let mut pending = lock(&self.pending, "fetch_deduplicated");
            match pending.get(&key) {
                Some(in_flight) => {
                    metric!(counter("queries.coalesced") += 1);
                    (in_flight.clone(), false)
                }
                None => {
                    let this = self.clone();
                    let fetch_key = key.clone();
                    let fetch = async move { this.execute(fetch_key, fetcher, options).await }
                        .boxed()
                        .shared();
                    pending.insert(key.clone(), fetch.clone());
                    (fetch, true)
                }
            }
        };

        if is_owner {
            self.subscribers.notify(&key, QueryState::Loading);
        }
        fetch.await
    }

    /// Runs the fetch and settles: updates the cache on success, clears
    /// the pending registry either way, and fans out the transition. Polled
    /// at most once per coalesced fetch.
    async fn execute<F, Fut>(&self, key: K, fetcher: F, options: QueryOptions) -> QueryResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<V>>,
    {
        let settled = PendingGuard {
            pending: Arc::clone(&self.pending),
            key: key.clone(),
        };

        match fetcher().await {
            Ok(value) => {
                metric!(counter("queries.fetch.ok") += 1);
                {
                    let mut store = lock(&self.store, "execute");
                    store.insert(
                        key.clone(),
                        StoredValue {
                            value: value.clone(),
                            stored_at: Instant::now(),
                        },
                        options.ttl,
                    );
                    metric!(gauge("caches.size") = store.len() as u64);
                }
                drop(settled);
                self.subscribers.notify(&key, QueryState::Success(value.clone()));
                Ok(value)
            }
            Err(err) => {
                metric!(counter("queries.fetch.error") += 1);
                tracing::debug!(error = %err, "query fetch failed");
                drop(settled);
                // Previously cached data outlives the failed fetch.
                self.subscribers.notify(&key, QueryState::Error(err.clone()));
                Err(err)
            }
        }
    }

    /// Deletes the cache entry for `key` and notifies subscribers with
    /// [`QueryState::Idle`].
    ///
    /// An in-flight fetch for `key` is deliberately not cancelled or
    /// suppressed: if it later succeeds it repopulates the slot. Callers
    /// who need the slot to stay empty must not race `invalidate` against
    /// a fetch.
    pub fn invalidate(&self, key: &K) {
        let removed = lock(&self.store, "invalidate").remove(key);
        if removed.is_some() {
            self.subscribers.notify(key, QueryState::Idle);
        }
    }

    /// Registers `listener` for `key`'s state transitions, returning a
    /// disposer handle. If a value is already cached the listener is
    /// invoked immediately with it.
    pub fn subscribe<F>(&self, key: K, listener: F) -> Subscription<K, V>
    where
        F: Fn(QueryState<V>) + Send + Sync + 'static,
    {
        let callback: Callback<V> = Arc::new(listener);
        if let Some(stored) = lock(&self.store, "subscribe").peek(&key) {
            callback(QueryState::Success(stored.value));
        }
        let id = self.subscribers.add(key.clone(), Arc::clone(&callback));
        Subscription::new(Arc::clone(&self.subscribers), key, id)
    }

    /// Non-mutating peek at the backing cache. Stale-but-unexpired values
    /// are included; recency order is not touched.
    pub fn cached(&self, key: &K) -> Option<V> {
        lock(&self.store, "cached")
            .peek(key)
            .map(|stored| stored.value)
    }

    /// Whether a fetch for `key` is currently in flight.
    pub fn is_fetching(&self, key: &K) -> bool {
        lock(&self.pending, "is_fetching").contains_key(key)
    }

    /// Sweeps expired entries out of the backing store. Safe to call while
    /// fetches are pending; the pending registry is untouched.
    pub fn evict_expired(&self) {
        lock(&self.store, "evict_expired").evict_expired();
    }

    /// Drops every completed value. Safe to call while fetches are
    /// pending; the pending registry is untouched.
    pub fn clear(&self) {
        lock(&self.store, "clear").clear();
    }

    /// Number of live entries in the backing cache.
    pub fn len(&self) -> usize {
        lock(&self.store, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
