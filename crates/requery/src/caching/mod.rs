//! # Caching primitives
//!
//! This module contains the synchronous, in-memory key/value stores the
//! [`QueryCoordinator`](crate::QueryCoordinator) is layered on, the
//! central [`FetchError`] type, and the [`QueryKey`] helper.
//!
//! ## Stores
//!
//! Three eviction policies, each a plain `&mut self` data structure with
//! no interior locking (callers serialize access; the coordinator wraps
//! its store in a mutex):
//!
//! - [`BoundedCache`]: fixed capacity, evicts the oldest-*inserted* entry.
//!   Reads never reorder anything.
//! - [`LruCache`]: fixed capacity, evicts the least-recently-*accessed*
//!   entry. A `get` hit is an observable side effect; `has` is not.
//! - [`ExpiringCache`]: unbounded, every entry carries its own absolute
//!   expiry. A read that discovers an expired entry deletes it (lazy
//!   eviction); [`ExpiringCache::cleanup`] additionally sweeps entries
//!   nobody reads again. The sweep is a memory-reclamation optimization
//!   only, read-side correctness never depends on it running.
//!
//! "Not found" is a first-class return value for all of them, never an
//! error. The only fatal condition is a zero capacity at construction
//! time, which is a programmer error.
//!
//! ## The coordinator seam
//!
//! The [`CacheStore`] trait is the small surface the coordinator needs
//! from a backing store. All three caches implement it for cloneable
//! values, which is how the backing policy is chosen per coordinator.
//!
//! ## Keys
//!
//! Any `Eq + Hash + Clone` type works as a key. [`QueryKey`] is a ready
//! made one: stable, human-readable metadata describing the query and all
//! of its inputs, hashed with SHA-256. Two logically distinct queries must
//! never serialize to the same metadata; collisions are not detected.
//!
//! ## Metrics
//!
//! Each store emits `caches.eviction` (capacity-driven removals, tagged
//! with `cache`) and the expiring store emits `caches.expired` for
//! TTL-driven removals. The coordinator layers `queries.*` counters on
//! top of these.

mod bounded;
mod error;
mod expiring;
mod key;
mod lru;
mod store;

pub use bounded::BoundedCache;
pub use error::{FetchError, QueryResult};
pub use expiring::ExpiringCache;
pub use key::{QueryKey, QueryKeyBuilder};
pub use lru::LruCache;
pub use store::CacheStore;
