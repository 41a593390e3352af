//! Entry Store Module
//!
//! The authoritative key-to-entry mapping with running size accounting.
//! The store is only ever mutated together with the LRU list and tag index
//! under the engine's single critical section; it carries no expiry or
//! recency logic of its own.

use std::collections::HashMap;

use crate::cache::CacheEntry;

// == Entry Store ==
/// Key-value storage with capacity accounting.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    /// Running sum of live entries' `size_bytes`
    total_size: usize,
}

impl EntryStore {
    // == Constructor ==
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// O(1) lookup. Does not check expiry or update recency; that is the
    /// engine's job, layered on top.
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    // == Insert ==
    /// Inserts or replaces an entry, returning the displaced entry if any.
    ///
    /// When replacing, the old entry's size is subtracted before the new
    /// size is added, so `total_size` always equals the sum of live sizes.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.total_size += entry.size_bytes;
        let displaced = self.entries.insert(entry.key.clone(), entry);
        if let Some(old) = &displaced {
            self.total_size -= old.size_bytes;
        }
        displaced
    }

    // == Remove ==
    /// Deletes and returns the removed entry so callers can clean up the
    /// tag index and recency list. Removing a missing key is a no-op.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = &removed {
            self.total_size -= entry.size_bytes;
        }
        removed
    }

    // == Accounting Accessors ==
    /// Total payload bytes currently held.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    // == Iteration ==
    /// Iterates live entries; used by the expiry sweep.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}
