//! # requery
//!
//! An in-memory query caching layer for clients that repeatedly fetch the
//! same remote data: it ties an injected async `fetcher` to a cache,
//! coalesces concurrent fetches for the same key, and serves stale values
//! while refreshing them in the background.
//!
//! ## Layers
//!
//! - Three cache primitives with different eviction policies:
//!   [`BoundedCache`] (insertion order), [`LruCache`] (recency of access)
//!   and [`ExpiringCache`] (per-entry time-to-live, evicted lazily on read
//!   plus an explicit sweep).
//! - The [`QueryCoordinator`] façade on top of any of them. It keeps a
//!   pending-fetch registry so that N concurrent `query` calls for one key
//!   invoke the fetcher exactly once, and all N callers observe the same
//!   result.
//! - A per-key subscription fabric that pushes [`QueryState`] transitions
//!   (`Loading` / `Success` / `Error` / `Idle`) to interested callers
//!   without polling.
//!
//! ## Freshness
//!
//! Two independent windows govern a cached value:
//!
//! - `ttl` (expiring backends only): how long the value may be returned at
//!   all. Past it, the entry is a plain miss and the caller waits for a
//!   fetch.
//! - `stale_time`: how long the value is returned without any network
//!   activity. Between `stale_time` and `ttl` the caller still gets the
//!   cached value immediately, and a deduplicated refresh runs in the
//!   background (stale-while-revalidate).
//!
//! A failed refresh never evicts previously cached data: subscribers see
//! an `Error` transition while the stale value stays readable.
//!
//! Everything is a single-process, in-memory structure. There is no
//! distributed coherence and no persistence; construct instances at your
//! composition root (see [`QueryCoordinator::from_config`]) instead of
//! relying on globals.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod logging;

mod coordinator;
mod lock;
mod subscription;

pub use caching::{
    BoundedCache, CacheStore, ExpiringCache, FetchError, LruCache, QueryKey, QueryKeyBuilder,
    QueryResult,
};
pub use config::{CachePolicy, CacheSettings, QueryOptions};
pub use coordinator::QueryCoordinator;
pub use subscription::{QueryState, Subscription};

#[cfg(test)]
mod tests;

// Instants come from tokio's controllable clock in tests so expiry and
// staleness can be verified deterministically without wall-clock sleeps.
#[cfg(test)]
pub(crate) use tokio::time;

#[cfg(not(test))]
pub(crate) use std::time;
