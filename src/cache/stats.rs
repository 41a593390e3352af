//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and
//! expirations. Counters are process-wide monotonic atomics so snapshots
//! never need the engine's lock; gauges (entry count, total bytes) are
//! updated inside the critical sections that change them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Atomic counter block owned by the engine.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    entry_count: AtomicUsize,
    total_size_bytes: AtomicUsize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Expiration ==
    /// Increments the expiration counter.
    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    // == Update Gauges ==
    /// Records the current entry count and total payload size.
    pub fn set_gauges(&self, count: usize, total_size_bytes: usize) {
        self.entry_count.store(count, Ordering::Relaxed);
        self.total_size_bytes.store(total_size_bytes, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Point-in-time view of the counters. Individual counters are each
    /// read atomically; the snapshot as a whole is eventually consistent
    /// with in-flight operations.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            count: self.entry_count.load(Ordering::Relaxed),
            total_size_bytes: self.total_size_bytes.load(Ordering::Relaxed),
        }
    }
}

// == Stats Snapshot ==
/// Read-only statistics view handed to external observers.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted under capacity pressure
    pub evictions: u64,
    /// Number of entries reclaimed by TTL expiry (lazy or swept)
    pub expirations: u64,
    /// Current number of entries in the cache
    pub count: usize,
    /// Current total payload bytes in the cache
    pub total_size_bytes: usize,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
