//! Cache Module
//!
//! Provides a concurrent in-memory cache with TTL expiration, LRU eviction,
//! tag-based invalidation and stampede-protected origin fetches.

mod engine;
mod entry;
mod fill;
mod lru;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use engine::{Cache, FetchOptions, PutOptions};
pub use entry::CacheEntry;
pub use stats::StatsSnapshot;

pub(crate) use engine::Inner;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
