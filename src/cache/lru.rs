//! LRU Tracker Module
//!
//! Maintains recency order for eviction decisions. Nodes live in a dense
//! arena (a `Vec` addressed by index, with explicit prev/next links and a
//! free-list for reclaimed slots) rather than a pointer-based linked list,
//! so touch, insert and remove are all O(1).
//!
//! Head = most recently used, tail = least recently used. Ties cannot occur:
//! list position is strictly ordered by touch/insert sequence, so entries
//! inserted earliest drain from the tail first.

use std::collections::HashMap;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node {
    key: String,
    prev: usize,
    next: usize,
}

// == LRU List ==
/// Tracks access order for LRU eviction.
#[derive(Debug)]
pub struct LruList {
    nodes: Vec<Node>,
    /// key -> arena slot of its node
    index: HashMap<String, usize>,
    /// Slots of removed nodes, reused before the arena grows
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl Default for LruList {
    fn default() -> Self {
        Self::new()
    }
}

impl LruList {
    // == Constructor ==
    /// Creates a new empty LRU list.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    // == Insert ==
    /// Adds a new key at the most-recently-used position.
    ///
    /// # Panics
    /// Panics if the key is already tracked; the engine must remove a key
    /// before re-inserting it.
    pub fn insert(&mut self, key: &str) {
        assert!(
            !self.index.contains_key(key),
            "LruList::insert called with already-tracked key: {key}"
        );

        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Node {
                    key: key.to_string(),
                    prev: NIL,
                    next: NIL,
                };
                slot
            }
            None => {
                self.nodes.push(Node {
                    key: key.to_string(),
                    prev: NIL,
                    next: NIL,
                });
                self.nodes.len() - 1
            }
        };

        self.index.insert(key.to_string(), slot);
        self.link_front(slot);
    }

    // == Touch ==
    /// Moves a key to the most-recently-used position.
    ///
    /// Untracked keys are ignored.
    pub fn touch(&mut self, key: &str) {
        if let Some(&slot) = self.index.get(key) {
            self.unlink(slot);
            self.link_front(slot);
        }
    }

    // == Remove ==
    /// Removes a key from the ordering; no-op if untracked.
    pub fn remove(&mut self, key: &str) {
        if let Some(slot) = self.index.remove(key) {
            self.unlink(slot);
            self.nodes[slot].key = String::new();
            self.free.push(slot);
        }
    }

    // == Evict Candidate ==
    /// Returns the least-recently-used key without removing it.
    ///
    /// The caller removes it explicitly once it has confirmed the key is
    /// safe to drop.
    pub fn evict_candidate(&self) -> Option<&str> {
        if self.tail == NIL {
            None
        } else {
            Some(&self.nodes[self.tail].key)
        }
    }

    // == Length ==
    /// Returns the number of tracked keys.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    // == Is Empty ==
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    #[allow(dead_code)]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    // == Internal Linkage ==
    fn link_front(&mut self, slot: usize) {
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;

        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;

        if self.tail == NIL {
            self.tail = slot;
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);

        if prev != NIL {
            self.nodes[prev].next = next;
        } else {
            self.head = next;
        }

        if next != NIL {
            self.nodes[next].prev = prev;
        } else {
            self.tail = prev;
        }

        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = NIL;
    }
}
