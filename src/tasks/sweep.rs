//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries, bounding
//! memory growth from entries that are never looked up again after expiring.
//! Each tick removes at most one configured batch under the engine's write
//! lock, so foreground operations are never blocked for long.

use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Inner;

/// Spawns the periodic expiry sweep for a cache.
///
/// The task holds only a `Weak` reference to the engine, so it exits on its
/// own once the last cache handle drops; `Cache::shutdown` aborts it
/// earlier. A panic inside a tick is isolated and logged, and the loop
/// continues on the next tick.
pub(crate) fn spawn_sweep_task(inner: Weak<Inner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(interval_ms = interval.as_millis() as u64, "expiry sweep loop running");

        loop {
            tokio::time::sleep(interval).await;

            let Some(inner) = inner.upgrade() else {
                debug!("cache dropped; expiry sweep loop exiting");
                break;
            };

            match AssertUnwindSafe(inner.sweep_once()).catch_unwind().await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "expiry sweep removed entries");
                }
                Ok(_) => {
                    debug!("expiry sweep found no expired entries");
                }
                Err(_) => {
                    warn!("expiry sweep tick panicked; continuing on next tick");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, PutOptions};
    use crate::config::CacheConfig;
    use bytes::Bytes;

    fn test_config(sweep_interval: Duration) -> CacheConfig {
        CacheConfig {
            capacity_bytes: 1024,
            default_ttl: None,
            sweep_interval,
            sweep_batch: 16,
        }
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let cache = Cache::new(test_config(Duration::from_millis(20)));

        cache
            .put(
                "expire_soon",
                Bytes::from_static(b"value"),
                PutOptions {
                    ttl: Some(Duration::from_millis(10)),
                    ..Default::default()
                },
            )
            .await
            .expect("put succeeds");

        cache.start_sweeper();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The sweep, not a lookup, reclaimed the entry
        let stats = cache.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.expirations, 1);

        cache.shutdown();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let cache = Cache::new(test_config(Duration::from_millis(20)));

        cache
            .put(
                "long_lived",
                Bytes::from_static(b"value"),
                PutOptions {
                    ttl: Some(Duration::from_secs(3600)),
                    ..Default::default()
                },
            )
            .await
            .expect("put succeeds");

        cache.start_sweeper();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cache.get("long_lived").await, Some(Bytes::from_static(b"value")));
        cache.shutdown();
    }

    #[tokio::test]
    async fn test_sweep_respects_batch_cap() {
        let mut config = test_config(Duration::from_millis(20));
        config.sweep_batch = 3;
        let cache = Cache::new(config);

        for i in 0..10 {
            cache
                .put(
                    &format!("k{i}"),
                    Bytes::from_static(b"v"),
                    PutOptions {
                        ttl: Some(Duration::ZERO),
                        ..Default::default()
                    },
                )
                .await
                .expect("put succeeds");
        }

        cache.start_sweeper();
        // One tick removes at most 3; several ticks drain the rest
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.stats().count >= 4, "single tick must not drain everything");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.stats().count, 0);
        assert_eq!(cache.stats().expirations, 10);

        cache.shutdown();
    }

    #[tokio::test]
    async fn test_sweep_task_exits_when_cache_dropped() {
        let cache = Cache::new(test_config(Duration::from_millis(10)));
        cache.start_sweeper();

        drop(cache);

        // Nothing to assert directly; the task aborts via Inner::drop and
        // its weak handle cannot keep the engine alive. Give it a beat to
        // unwind without panicking the test runtime.
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_start_sweeper_is_idempotent() {
        let cache = Cache::new(test_config(Duration::from_millis(10)));

        cache.start_sweeper();
        cache.start_sweeper();
        cache.shutdown();
        cache.shutdown();
    }
}
