//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// Entries are replaced wholesale by puts, never partially updated. The
/// payload is opaque; `size_bytes` is caller-declared and the engine never
/// inspects the value contents.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The key this entry is stored under
    pub key: String,
    /// The stored payload
    pub value: Bytes,
    /// Size used for capacity accounting
    pub size_bytes: usize,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Tags this entry is indexed under, for bulk invalidation
    pub tags: HashSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL and tags.
    ///
    /// # Arguments
    /// * `key` - The key the entry is stored under
    /// * `value` - The payload to store
    /// * `size_bytes` - Caller-declared size for capacity accounting
    /// * `ttl` - Optional TTL; `None` means the entry never expires
    /// * `tags` - Tags for group invalidation; may be empty
    pub fn new(
        key: String,
        value: Bytes,
        size_bytes: usize,
        ttl: Option<Duration>,
        tags: HashSet<String>,
    ) -> Self {
        let now = current_timestamp_ms();
        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64));

        Self {
            key,
            value,
            size_bytes,
            created_at: now,
            expires_at,
            tags,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at the given instant.
    ///
    /// Boundary condition: an entry is expired when `now` is greater than or
    /// equal to the expiration time, so a TTL of zero is expired on the very
    /// next lookup.
    pub fn is_expired(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
