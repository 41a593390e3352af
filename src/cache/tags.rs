//! Tag Index Module
//!
//! Secondary index from tag to key set, enabling bulk invalidation of a
//! logically related group of entries. Kept in lock-step with the entry
//! store under the engine's critical section: a key appears under tag T
//! exactly when its entry's tag set contains T.

use std::collections::{HashMap, HashSet};

// == Tag Index ==
/// Mapping from tag to the set of keys carrying it.
#[derive(Debug, Default)]
pub struct TagIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    // == Constructor ==
    /// Creates a new empty tag index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Add Key To Tags ==
    /// Registers a key under each tag's bucket.
    pub fn add_key(&mut self, key: &str, tags: &HashSet<String>) {
        for tag in tags {
            self.buckets
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    // == Remove Key From Tags ==
    /// Deregisters a key from each tag's bucket; emptied buckets are pruned.
    pub fn remove_key(&mut self, key: &str, tags: &HashSet<String>) {
        for tag in tags {
            if let Some(bucket) = self.buckets.get_mut(tag) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.buckets.remove(tag);
                }
            }
        }
    }

    // == Keys For Tag ==
    /// Returns a snapshot of the keys currently under a tag, not a live
    /// view, so callers iterating to invalidate are unaffected by concurrent
    /// mutation.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<String> {
        self.buckets
            .get(tag)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    // == Introspection ==
    /// Number of non-empty tag buckets.
    #[allow(dead_code)]
    pub fn tag_count(&self) -> usize {
        self.buckets.len()
    }

    /// Iterates tag buckets; used by invariant checks.
    #[allow(dead_code)]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.buckets.iter()
    }

    /// Whether a key is registered under a tag.
    #[allow(dead_code)]
    pub fn contains(&self, tag: &str, key: &str) -> bool {
        self.buckets
            .get(tag)
            .map(|bucket| bucket.contains(key))
            .unwrap_or(false)
    }
}
