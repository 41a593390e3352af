//! Origin Collaborator
//!
//! The cache fronts a slower authoritative backing store. This module defines
//! the narrow contract the engine needs from it: fetch a key, report whether
//! it exists, or fail.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;

// == Origin Trait ==
/// The backing store the cache fronts on a miss.
///
/// `Ok(None)` means the origin authoritatively has no value for the key;
/// nothing is cached and the caller sees a miss. Errors are never cached.
/// Retry and backoff around a failing origin are the caller's concern, not
/// the cache's.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>>;
}

// == Closure Adapter ==
/// Boxed future returned by [`FnOrigin`] closures.
pub type FetchFuture = Pin<Box<dyn Future<Output = anyhow::Result<Option<Bytes>>> + Send>>;

/// Adapts a closure into an [`Origin`], for tests and ad-hoc callers.
pub struct FnOrigin<F>
where
    F: Fn(String) -> FetchFuture + Send + Sync,
{
    fetch_fn: F,
}

impl<F> FnOrigin<F>
where
    F: Fn(String) -> FetchFuture + Send + Sync,
{
    pub fn new(fetch_fn: F) -> Self {
        Self { fetch_fn }
    }
}

#[async_trait]
impl<F> Origin for FnOrigin<F>
where
    F: Fn(String) -> FetchFuture + Send + Sync,
{
    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        (self.fetch_fn)(key.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_origin_found() {
        let origin = FnOrigin::new(|key: String| {
            Box::pin(async move { Ok(Some(Bytes::from(format!("value-for-{key}")))) })
                as FetchFuture
        });

        let value = origin.fetch("k1").await.unwrap();
        assert_eq!(value, Some(Bytes::from("value-for-k1")));
    }

    #[tokio::test]
    async fn test_fn_origin_not_found() {
        let origin =
            FnOrigin::new(|_key: String| Box::pin(async move { Ok(None) }) as FetchFuture);

        let value = origin.fetch("missing").await.unwrap();
        assert!(value.is_none());
    }
}
