//! Cache Engine Module
//!
//! The façade coordinating the entry store, LRU list, tag index and fill
//! coordinator under one concurrency discipline.
//!
//! # Locking
//!
//! The entry store, recency list, tag index and fill-generation map form one
//! logical unit of mutable state (`CacheState`) behind a single
//! `tokio::sync::RwLock`. `get` takes the write lock because the recency
//! touch is itself a mutation. The fill coordinator's token map has its own
//! lock; no code path holds both at once.
//!
//! # Invalidation vs. in-flight fills
//!
//! Invalidate wins: each fill stamps a per-key generation when it starts,
//! `invalidate` bumps the generation of any in-flight fill, and a completing
//! fill whose stamp is stale delivers its value to waiters without caching
//! it. The generation entry exists only while the fill is in flight.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::entry::{current_timestamp_ms, CacheEntry};
use crate::cache::fill::{self, FillCoordinator, FillResult, Join};
use crate::cache::lru::LruList;
use crate::cache::stats::CacheStats;
use crate::cache::store::EntryStore;
use crate::cache::tags::TagIndex;
use crate::cache::{StatsSnapshot, MAX_KEY_LENGTH};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::origin::Origin;
use crate::tasks::spawn_sweep_task;

// == Put Options ==
/// Optional parameters for [`Cache::put`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// TTL for the entry; falls back to the configured default when `None`
    pub ttl: Option<Duration>,
    /// Tags for group invalidation
    pub tags: Vec<String>,
    /// Caller-declared size; defaults to the payload length. The engine
    /// never introspects the value.
    pub size_bytes: Option<usize>,
}

// == Fetch Options ==
/// Optional parameters for [`Cache::get_or_fetch`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// TTL applied when the fill result is cached
    pub ttl: Option<Duration>,
    /// Tags applied when the fill result is cached
    pub tags: Vec<String>,
    /// Deadline for waiting on the fill; the fetch itself keeps running for
    /// other waiters when this elapses
    pub deadline: Option<tokio::time::Instant>,
}

// == Shared State ==
/// The three index structures plus fill generations, mutated only together.
#[derive(Debug)]
pub(crate) struct CacheState {
    pub(crate) store: EntryStore,
    pub(crate) lru: LruList,
    pub(crate) tags: TagIndex,
    /// Generation per key with an in-flight fill; bumped by invalidation,
    /// removed when the fill completes
    fill_gens: HashMap<String, u64>,
}

impl CacheState {
    fn new() -> Self {
        Self {
            store: EntryStore::new(),
            lru: LruList::new(),
            tags: TagIndex::new(),
            fill_gens: HashMap::new(),
        }
    }

    /// Removes a key from the store, recency list and tag index together,
    /// returning the removed entry.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.store.remove(key)?;
        self.lru.remove(key);
        self.tags.remove_key(key, &removed.tags);
        Some(removed)
    }

    /// Inserts an entry into all three structures. The caller must have
    /// removed any prior entry for the key first.
    fn insert_entry(&mut self, entry: CacheEntry) {
        self.lru.insert(&entry.key);
        self.tags.add_key(&entry.key, &entry.tags);
        self.store.insert(entry);
    }

    /// Evicts least-recently-used entries until total size fits capacity.
    /// Returns the number of evictions performed.
    fn enforce_capacity(&mut self, capacity_bytes: usize, stats: &CacheStats) -> usize {
        let mut evicted = 0;
        while self.store.total_size() > capacity_bytes && self.store.count() > 0 {
            let Some(victim) = self.lru.evict_candidate().map(str::to_string) else {
                break;
            };
            self.remove_entry(&victim);
            stats.record_eviction();
            debug!(key = %victim, "evicted least-recently-used entry");
            evicted += 1;
        }
        evicted
    }

    /// Removes up to `max` expired entries. The write lock is held for the
    /// whole (capped) batch; the cap bounds foreground latency impact.
    fn sweep_expired(&mut self, now: u64, max: usize, stats: &CacheStats) -> usize {
        let expired: Vec<String> = self
            .store
            .iter()
            .filter(|entry| entry.is_expired(now))
            .take(max)
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
            stats.record_expiration();
        }
        expired.len()
    }
}

// == Engine Internals ==
#[derive(Debug)]
pub(crate) struct Inner {
    config: CacheConfig,
    state: RwLock<CacheState>,
    stats: CacheStats,
    fills: FillCoordinator,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn sync_gauges(&self, state: &CacheState) {
        self.stats
            .set_gauges(state.store.count(), state.store.total_size());
    }

    /// One bounded sweep pass; called by the background task each tick.
    pub(crate) async fn sweep_once(&self) -> usize {
        let mut state = self.state.write().await;
        let removed = state.sweep_expired(
            current_timestamp_ms(),
            self.config.sweep_batch,
            &self.stats,
        );
        if removed > 0 {
            self.sync_gauges(&state);
        }
        removed
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

// == Cache ==
/// A concurrent, capacity-bounded cache with TTL expiry, LRU eviction,
/// tag invalidation and stampede-protected origin fetches.
///
/// Explicitly constructed and cheaply cloneable; multiple independent
/// instances can coexist in one process. The background expiry sweep is
/// started with [`Cache::start_sweeper`] and stopped by [`Cache::shutdown`]
/// or when the last handle drops.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<Inner>,
}

enum Lookup {
    Hit(Bytes),
    Expired,
    Miss,
}

impl Cache {
    // == Constructor ==
    /// Creates a new cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(CacheState::new()),
                stats: CacheStats::new(),
                fills: FillCoordinator::new(),
                sweeper: StdMutex::new(None),
            }),
        }
    }

    // == Sweeper Lifecycle ==
    /// Starts the background expiry sweep task. Idempotent; must be called
    /// from within a tokio runtime.
    ///
    /// The task holds only a weak reference to the cache, so it exits on its
    /// own once the last handle drops.
    pub fn start_sweeper(&self) {
        let mut slot = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let running = slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if running {
            return;
        }
        *slot = Some(spawn_sweep_task(
            Arc::downgrade(&self.inner),
            self.inner.config.sweep_interval,
        ));
        info!(
            interval_ms = self.inner.config.sweep_interval.as_millis() as u64,
            batch = self.inner.config.sweep_batch,
            "expiry sweep task started"
        );
    }

    /// Stops the background sweep task deterministically. Idempotent.
    pub fn shutdown(&self) {
        if let Some(handle) = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            handle.abort();
            info!("expiry sweep task stopped");
        }
    }

    // == Get ==
    /// Retrieves a value by key, updating recency on a hit.
    ///
    /// An expired entry is reclaimed inline, counted as both an expiration
    /// and a miss, and reported as absent; the caller never sees stale data.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let mut state = self.inner.state.write().await;
        let now = current_timestamp_ms();

        let lookup = match state.store.get(key) {
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => Lookup::Hit(entry.value.clone()),
            None => Lookup::Miss,
        };

        match lookup {
            Lookup::Hit(value) => {
                state.lru.touch(key);
                self.inner.stats.record_hit();
                Some(value)
            }
            Lookup::Expired => {
                state.remove_entry(key);
                self.inner.stats.record_expiration();
                self.inner.stats.record_miss();
                self.inner.sync_gauges(&state);
                debug!(key, "entry expired on lookup");
                None
            }
            Lookup::Miss => {
                self.inner.stats.record_miss();
                None
            }
        }
    }

    // == Put ==
    /// Stores a value, replacing any prior entry for the key wholesale and
    /// evicting least-recently-used entries while over capacity.
    ///
    /// A payload whose size alone exceeds total capacity is rejected with
    /// [`CacheError::CapacityExceeded`] and the cache is left untouched;
    /// caching it would evict everything else to no benefit.
    pub async fn put(&self, key: &str, value: Bytes, opts: PutOptions) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "key exceeds maximum length of {MAX_KEY_LENGTH} bytes"
            )));
        }

        let size_bytes = opts.size_bytes.unwrap_or(value.len());
        if size_bytes > self.inner.config.capacity_bytes {
            return Err(CacheError::CapacityExceeded {
                requested: size_bytes,
                capacity: self.inner.config.capacity_bytes,
            });
        }

        let ttl = opts.ttl.or(self.inner.config.default_ttl);
        let tags: HashSet<String> = opts.tags.into_iter().collect();
        let entry = CacheEntry::new(key.to_string(), value, size_bytes, ttl, tags);

        let mut state = self.inner.state.write().await;
        state.remove_entry(key);
        state.insert_entry(entry);
        state.enforce_capacity(self.inner.config.capacity_bytes, &self.inner.stats);
        self.inner.sync_gauges(&state);
        Ok(())
    }

    // == Get Or Fetch ==
    /// Returns the cached value, or fetches it from the origin with at most
    /// one concurrent fetch per key.
    ///
    /// `Ok(None)` means the origin has no value for the key; nothing is
    /// cached. Origin errors are fanned out to every waiter and nothing is
    /// cached, leaving the key idle for a later retry. A waiter whose
    /// deadline elapses gets [`CacheError::DeadlineExceeded`] while the
    /// fetch continues for the others.
    pub async fn get_or_fetch(
        &self,
        key: &str,
        origin: Arc<dyn Origin>,
        opts: FetchOptions,
    ) -> Result<Option<Bytes>> {
        if let Some(value) = self.get(key).await {
            return Ok(Some(value));
        }

        let rx = match self.inner.fills.join(key).await {
            Join::Waiter(rx) => rx,
            Join::Leader { tx, rx } => {
                let inner = Arc::clone(&self.inner);
                let fill_key = key.to_string();
                let ttl = opts.ttl;
                let fill_tags = opts.tags.clone();
                // No await between acquiring the token and this spawn: the
                // fill task owns the token's lifecycle from here, so the key
                // cannot wedge even if this caller's future is dropped.
                tokio::spawn(async move {
                    run_fill(inner, fill_key, origin, ttl, fill_tags, tx).await;
                });
                rx
            }
        };

        let outcome = fill::wait(rx, key, opts.deadline).await?;
        outcome.map_err(CacheError::origin)
    }

    // == Invalidate ==
    /// Removes a key from all structures; returns whether a live entry was
    /// actually removed. Also marks any in-flight fill for the key so its
    /// eventual result is not cached.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut state = self.inner.state.write().await;
        let removed = state.remove_entry(key).is_some();
        if let Some(gen) = state.fill_gens.get_mut(key) {
            *gen += 1;
        }
        if removed {
            self.inner.sync_gauges(&state);
            debug!(key, "entry invalidated");
        }
        removed
    }

    // == Invalidate By Tag ==
    /// Invalidates every key currently under a tag; returns the number of
    /// entries actually removed.
    ///
    /// The group operation is a sequence of individually atomic removals,
    /// not a transaction: a concurrent reader may observe some members
    /// already gone while others remain.
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys = self.inner.state.read().await.tags.keys_for_tag(tag);

        let mut removed = 0;
        for key in keys {
            if self.invalidate(&key).await {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(tag, removed, "tag invalidation completed");
        }
        removed
    }

    // == Stats ==
    /// Point-in-time statistics; atomic counter reads only, no locking.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    // == Test Support ==
    #[cfg(test)]
    pub(crate) async fn assert_invariants(&self) {
        let state = self.inner.state.read().await;

        assert_eq!(
            state.store.count(),
            state.lru.len(),
            "store and recency list out of lock-step"
        );

        let sum: usize = state.store.iter().map(|e| e.size_bytes).sum();
        assert_eq!(state.store.total_size(), sum, "size accounting drifted");
        assert!(
            state.store.total_size() <= self.inner.config.capacity_bytes,
            "capacity exceeded"
        );

        for entry in state.store.iter() {
            assert!(state.lru.contains(&entry.key), "entry missing from LRU");
            for tag in &entry.tags {
                assert!(
                    state.tags.contains(tag, &entry.key),
                    "entry tag missing from index"
                );
            }
        }
        for (tag, keys) in state.tags.iter() {
            for key in keys {
                let entry = state.store.get(key).expect("indexed key not in store");
                assert!(entry.tags.contains(tag), "index references untagged entry");
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn inflight_fills(&self) -> usize {
        self.inner.fills.inflight_count().await
    }
}

// == Fill Task ==
/// Runs one origin fetch, caches the result unless the key was invalidated
/// mid-flight or the payload is oversized, then broadcasts to all waiters.
/// A panicking origin resolves to an error instead of wedging waiters.
async fn run_fill(
    inner: Arc<Inner>,
    key: String,
    origin: Arc<dyn Origin>,
    ttl: Option<Duration>,
    tags: Vec<String>,
    tx: tokio::sync::watch::Sender<Option<FillResult>>,
) {
    // Stamp the fill generation before the fetch is issued. An invalidation
    // after this point bumps the stamp; an invalidation before it also
    // precedes the fetch, so the fetched value is never staler than it.
    let started_gen = {
        let mut state = inner.state.write().await;
        *state.fill_gens.entry(key.clone()).or_insert(0)
    };

    let fetched = AssertUnwindSafe(origin.fetch(&key)).catch_unwind().await;
    let result: FillResult = match fetched {
        Ok(Ok(found)) => Ok(found),
        Ok(Err(err)) => {
            debug!(key = %key, error = %err, "origin fetch failed");
            Err(Arc::new(err))
        }
        Err(_) => {
            warn!(key = %key, "origin fetch panicked");
            Err(Arc::new(anyhow::anyhow!(
                "origin fetch panicked for key: {key}"
            )))
        }
    };

    {
        let mut state = inner.state.write().await;
        let current_gen = state.fill_gens.remove(&key).unwrap_or(started_gen);

        if current_gen != started_gen {
            debug!(key = %key, "key invalidated during fill; result not cached");
        } else if let Ok(Some(value)) = &result {
            let size_bytes = value.len();
            if size_bytes > inner.config.capacity_bytes {
                warn!(
                    key = %key,
                    size_bytes,
                    "fill result exceeds capacity; delivered to waiters but not cached"
                );
            } else {
                let entry = CacheEntry::new(
                    key.clone(),
                    value.clone(),
                    size_bytes,
                    ttl.or(inner.config.default_ttl),
                    tags.into_iter().collect(),
                );
                state.remove_entry(&key);
                state.insert_entry(entry);
                state.enforce_capacity(inner.config.capacity_bytes, &inner.stats);
                inner.sync_gauges(&state);
            }
        }
    }

    // Token out of the map first, then broadcast: waiters hold receiver
    // clones, and a new caller after this point starts a fresh fill.
    inner.fills.complete(&key).await;
    let _ = tx.send(Some(result));
}
