//! Edge Cache - A concurrent, capacity-bounded in-memory cache
//!
//! Provides TTL expiry, LRU eviction, tag-based bulk invalidation, and
//! stampede-protected origin fetches.

pub mod cache;
pub mod config;
pub mod error;
pub mod origin;

mod tasks;

pub use cache::{Cache, FetchOptions, PutOptions, StatsSnapshot};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use origin::{FetchFuture, FnOrigin, Origin};
