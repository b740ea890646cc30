use std::time::Duration;

use serde::Deserialize;

/// Which eviction policy backs a coordinator's cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Per-entry TTL, unbounded size ([`ExpiringCache`](crate::ExpiringCache)).
    Expiring,
    /// Fixed capacity, recency-of-access eviction ([`LruCache`](crate::LruCache)).
    Lru,
    /// Fixed capacity, insertion-order eviction ([`BoundedCache`](crate::BoundedCache)).
    Bounded,
}

/// Configuration for one logical group of queries, typically one section
/// of the embedding application's config file.
///
/// Durations accept humantime strings (`"300ms"`, `"5m"`, `"2h"`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// The eviction policy of the backing cache.
    pub policy: CachePolicy,
    /// Maximum number of entries for capacity-bound policies. Ignored by
    /// the expiring policy.
    pub capacity: usize,
    /// How long a stored value remains eligible to be returned at all.
    /// `None` means forever.
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// How long a stored value is returned without triggering a background
    /// refetch.
    #[serde(with = "humantime_serde")]
    pub stale_time: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            policy: CachePolicy::Expiring,
            capacity: 1024,
            ttl: None,
            stale_time: Duration::ZERO,
        }
    }
}

impl CacheSettings {
    /// The configured capacity, clamped so capacity-bound caches can
    /// always be constructed.
    pub fn capacity(&self) -> usize {
        self.capacity.max(1)
    }
}

/// Per-call query knobs.
///
/// The defaults make every cached value immediately stale (`stale_time`
/// of zero) and never expire it (`ttl` of `None`): each query is answered
/// from cache when possible and revalidated in the background.
#[derive(Clone, Copy, Debug)]
pub struct QueryOptions {
    /// How long a fetched value remains eligible to be returned at all.
    /// `None` means forever. Only meaningful with an expiring backing
    /// cache.
    pub ttl: Option<Duration>,
    /// How long a fetched value is returned without any fetch activity.
    /// Past this window the value is still served, but a deduplicated
    /// background refresh is triggered.
    pub stale_time: Duration,
    /// When `false`, neither the cache nor the fetcher are consulted and
    /// the key stays `Idle`.
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            stale_time: Duration::ZERO,
            enabled: true,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Suppresses both cache reads and fetch triggering; queries return
    /// [`FetchError::Disabled`](crate::FetchError::Disabled).
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl From<&CacheSettings> for QueryOptions {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            ttl: settings.ttl,
            stale_time: settings.stale_time,
            enabled: true,
        }
    }
}
