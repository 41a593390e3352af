//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// "Key not found" is deliberately not an error: `get` returns `Option` and
/// `get_or_fetch` returns `Ok(None)` when the origin authoritatively has no
/// value for the key.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A single payload alone exceeds the configured total capacity.
    /// The entry is rejected outright and the cache is left untouched.
    #[error("payload of {requested} bytes exceeds cache capacity of {capacity} bytes")]
    CapacityExceeded { requested: usize, capacity: usize },

    /// The origin collaborator failed. The same underlying error is fanned
    /// out to every waiter that joined the fill, hence the `Arc`.
    #[error("origin fetch failed: {0}")]
    OriginFetch(Arc<anyhow::Error>),

    /// The caller-supplied deadline elapsed while waiting on an in-flight
    /// fill. The fetch itself keeps running for the remaining waiters.
    #[error("deadline exceeded while waiting for fill of key: {0}")]
    DeadlineExceeded(String),

    /// Invalid request data (e.g. an oversized key).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal engine error (e.g. a fill channel torn down mid-wait).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps an origin failure for fan-out to all waiters of a fill.
    pub(crate) fn origin(err: Arc<anyhow::Error>) -> Self {
        CacheError::OriginFetch(err)
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
