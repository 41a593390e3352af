//! Fill Coordinator Module
//!
//! Stampede protection: guarantees at most one in-flight origin fetch per
//! key and fans the result out to every caller that joined while the fetch
//! was pending. A token is a `watch` channel; the first caller for a key
//! becomes the leader and owns the sender, later callers clone the receiver
//! and wait. Once the result is broadcast the token is discarded and the
//! key returns to idle, so a failed fetch can be retried by the next caller.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::error::CacheError;

// == Fill Result ==
/// Outcome of one origin fetch, shared by every waiter. `Ok(None)` means the
/// origin authoritatively has no value; errors are wrapped in `Arc` so a
/// single failure can be handed to all waiters.
pub(crate) type FillResult = Result<Option<Bytes>, Arc<anyhow::Error>>;

type FillReceiver = watch::Receiver<Option<FillResult>>;
type FillSender = watch::Sender<Option<FillResult>>;

#[derive(Debug)]
struct FillHandle {
    rx: FillReceiver,
}

// == Join Outcome ==
/// What a caller got when it asked to join a fill for a key.
pub(crate) enum Join {
    /// No fetch was in flight; the caller must issue the fetch and resolve
    /// the token through the sender.
    Leader { tx: FillSender, rx: FillReceiver },
    /// A fetch is already in flight; wait on the receiver.
    Waiter(FillReceiver),
}

// == Fill Coordinator ==
#[derive(Debug, Default)]
pub(crate) struct FillCoordinator {
    inflight: Mutex<HashMap<String, FillHandle>>,
}

impl FillCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // == Join ==
    /// Attaches to the in-flight fetch for `key`, creating the token if none
    /// exists. The map lock is held across the check-and-insert, so two
    /// callers can never both become leader for the same key.
    pub(crate) async fn join(&self, key: &str) -> Join {
        let mut inflight = self.inflight.lock().await;
        match inflight.entry(key.to_string()) {
            Entry::Occupied(occupied) => Join::Waiter(occupied.get().rx.clone()),
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(FillHandle { rx: rx.clone() });
                Join::Leader { tx, rx }
            }
        }
    }

    // == Complete ==
    /// Discards the token for `key`, returning it to idle. Called by the
    /// fill task before broadcasting the result; waiters hold their own
    /// receiver clones and are unaffected.
    pub(crate) async fn complete(&self, key: &str) {
        self.inflight.lock().await.remove(key);
    }

    #[cfg(test)]
    pub(crate) async fn inflight_count(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

// == Wait ==
/// Waits for a fill to resolve, bounded by an optional caller deadline.
///
/// A deadline that elapses returns `DeadlineExceeded` to this waiter only;
/// the fetch task and the remaining waiters are unaffected.
pub(crate) async fn wait(
    mut rx: FillReceiver,
    key: &str,
    deadline: Option<Instant>,
) -> Result<FillResult, CacheError> {
    let recv = async {
        let resolved = rx
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| CacheError::Internal(format!("fill channel closed for key: {key}")))?
            .clone();
        resolved.ok_or_else(|| CacheError::Internal(format!("empty fill result for key: {key}")))
    };

    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, recv)
            .await
            .map_err(|_| CacheError::DeadlineExceeded(key.to_string()))?,
        None => recv.await,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_join_is_leader() {
        let coordinator = FillCoordinator::new();

        assert!(matches!(coordinator.join("k").await, Join::Leader { .. }));
        assert_eq!(coordinator.inflight_count().await, 1);
    }

    #[tokio::test]
    async fn test_second_join_is_waiter() {
        let coordinator = FillCoordinator::new();

        let _leader = coordinator.join("k").await;
        assert!(matches!(coordinator.join("k").await, Join::Waiter(_)));
        assert_eq!(coordinator.inflight_count().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_tokens() {
        let coordinator = FillCoordinator::new();

        assert!(matches!(coordinator.join("a").await, Join::Leader { .. }));
        assert!(matches!(coordinator.join("b").await, Join::Leader { .. }));
        assert_eq!(coordinator.inflight_count().await, 2);
    }

    #[tokio::test]
    async fn test_complete_returns_key_to_idle() {
        let coordinator = FillCoordinator::new();

        let _leader = coordinator.join("k").await;
        coordinator.complete("k").await;

        assert_eq!(coordinator.inflight_count().await, 0);
        assert!(matches!(coordinator.join("k").await, Join::Leader { .. }));
    }

    #[tokio::test]
    async fn test_wait_receives_broadcast() {
        let coordinator = FillCoordinator::new();

        let Join::Leader { tx, .. } = coordinator.join("k").await else {
            panic!("expected leader");
        };
        let Join::Waiter(rx) = coordinator.join("k").await else {
            panic!("expected waiter");
        };

        tx.send(Some(Ok(Some(Bytes::from_static(b"v")))))
            .expect("waiter receiver alive");

        let result = wait(rx, "k", None).await.expect("wait succeeds");
        assert_eq!(result.expect("fill ok"), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_wait_deadline_elapses() {
        let coordinator = FillCoordinator::new();

        let Join::Leader { tx: _tx, rx } = coordinator.join("k").await else {
            panic!("expected leader");
        };

        let deadline = Instant::now() + Duration::from_millis(20);
        let err = wait(rx, "k", Some(deadline)).await.expect_err("must time out");
        assert!(matches!(err, CacheError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn test_wait_errors_when_sender_dropped() {
        let coordinator = FillCoordinator::new();

        let Join::Leader { tx, rx } = coordinator.join("k").await else {
            panic!("expected leader");
        };
        drop(tx);

        let err = wait(rx, "k", None).await.expect_err("channel closed");
        assert!(matches!(err, CacheError::Internal(_)));
    }
}
