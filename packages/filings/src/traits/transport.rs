//! Transport trait - one raw outbound request, no pacing or retry.
//!
//! The rate-limited client layers pacing, retries and caching on top of any
//! `Transport`, so tests can substitute a scripted transport for the network.

use async_trait::async_trait;

use crate::error::FetchResult;

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` and return the response body.
    ///
    /// Implementations classify failures: network errors, timeouts, 5xx and
    /// 429 as [`FetchError::Transient`](crate::error::FetchError::Transient),
    /// other non-success statuses as permanent.
    async fn get(&self, url: &str) -> FetchResult<String>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn get(&self, url: &str) -> FetchResult<String> {
        (**self).get(url).await
    }
}
