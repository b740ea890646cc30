use std::time::Duration;

use thiserror::Error;

/// An error produced while fetching the value for a query.
///
/// This enum is cloneable and comparable so a single failure can be fanned
/// out to every coalesced caller and every subscriber of the key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote source reported that the requested data does not exist.
    #[error("not found")]
    NotFound,
    /// The fetch did not settle within the fetcher's own deadline.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    /// The fetch failed for another reason, like connection loss or a 5xx
    /// response.
    ///
    /// The attached string contains the fetcher's description of the
    /// failure.
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The fetch succeeded but the payload is invalid in some way.
    #[error("malformed: {0}")]
    Malformed(String),
    /// The query was issued with `enabled: false`; neither the cache nor
    /// the fetcher were consulted.
    #[error("query is disabled")]
    Disabled,
    /// An unexpected error inside the caching layer itself.
    #[error("internal error")]
    Internal,
}

impl From<std::io::Error> for FetchError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        Self::from_std_error(err)
    }
}

impl FetchError {
    /// Folds an arbitrary error into [`Internal`](Self::Internal), logging
    /// the source.
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr, "internal caching error");
        Self::Internal
    }
}

/// The outcome of a query, either the fetched/cached value or the reason
/// it could not be produced.
pub type QueryResult<T> = Result<T, FetchError>;
