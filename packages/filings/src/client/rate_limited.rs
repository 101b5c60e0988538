//! Rate-limited, retrying, cache-aware fetch client.
//!
//! Wraps any [`Transport`] with:
//! - a process-wide minimum interval between outbound requests (governor)
//! - exponential backoff retries for transient failures
//! - cache lookup before, and cache write-back after, each network fetch
//!
//! Cache hits return before the limiter is consulted, so they never delay
//! later network requests.

use governor::{Quota, RateLimiter};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::stores::cache::{Cache, CacheKey};
use crate::traits::transport::Transport;
use crate::types::config::FetchConfig;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// One fetch: a URL plus the cache identity to consult, if any.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub cache_key: Option<CacheKey>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache_key: None,
        }
    }

    /// Consult and populate the cache under `key`.
    pub fn cached_as(mut self, key: CacheKey) -> Self {
        self.cache_key = Some(key);
        self
    }
}

/// A transport wrapper that enforces pacing, retries and caching.
pub struct RateLimitedClient<T: Transport> {
    inner: T,
    limiter: Option<Arc<DefaultRateLimiter>>,
    cache: Option<Arc<Cache>>,
    config: FetchConfig,
}

impl<T: Transport> RateLimitedClient<T> {
    /// Create a client. A zero request delay disables pacing.
    pub fn new(inner: T, config: FetchConfig) -> Self {
        // Burst of one: every permit is spaced by the full period.
        let limiter = Quota::with_period(config.request_delay())
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self {
            inner,
            limiter,
            cache: None,
            config,
        }
    }

    /// Attach a cache store.
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&Arc<Cache>> {
        self.cache.as_ref()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Fetch a request's body, from cache when possible.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult<String> {
        if let (Some(cache), Some(key)) = (&self.cache, &request.cache_key) {
            if let Some(body) = cache.get(key).await {
                return Ok(body);
            }
        }

        let body = self.fetch_with_retry(&request.url).await?;

        if let (Some(cache), Some(key)) = (&self.cache, &request.cache_key) {
            if let Err(e) = cache.put(key, body.clone()).await {
                warn!(key = %key, error = %e, "failed to write cache entry");
            }
        }

        Ok(body)
    }

    /// Wait for the rate limiter before proceeding.
    async fn wait_for_permit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn fetch_with_retry(&self, url: &str) -> FetchResult<String> {
        let mut attempt: u32 = 0;
        loop {
            self.wait_for_permit().await;

            match self.inner.get(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    debug!(url = %url, attempts = attempt + 1, "retries exhausted");
                    return Err(e.into_permanent(attempt + 1));
                }
                Err(e) => return Err(with_attempts(e, attempt + 1)),
            }
        }
    }
}

fn with_attempts(error: FetchError, attempts: u32) -> FetchError {
    match error {
        FetchError::Permanent {
            url,
            reason,
            status,
            ..
        } => FetchError::Permanent {
            url,
            reason,
            status,
            attempts,
        },
        transient => transient.into_permanent(attempts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::stores::memory::MemoryCacheBackend;
    use crate::testing::MockTransport;
    use crate::types::{cik::Cik, config::CacheConfig};
    use std::time::{Duration, Instant};

    fn config(delay_ms: u64) -> FetchConfig {
        FetchConfig::default()
            .with_request_delay_ms(delay_ms)
            .with_retry_base_ms(5)
            .with_max_retries(2)
    }

    fn memory_cache() -> Arc<Cache> {
        Arc::new(Cache::new(
            Arc::new(MemoryCacheBackend::new()),
            Arc::new(SystemClock),
            CacheConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_consecutive_fetches_respect_min_interval() {
        let transport = MockTransport::new()
            .with_response("https://x/1", "1")
            .with_response("https://x/2", "2")
            .with_response("https://x/3", "3")
            .with_response("https://x/4", "4");
        let client = RateLimitedClient::new(transport, config(50));

        let start = Instant::now();
        for i in 1..=4 {
            let body = client
                .fetch(&FetchRequest::new(format!("https://x/{}", i)))
                .await
                .unwrap();
            assert_eq!(body, i.to_string());
        }

        // First request is immediate, the other three each wait one interval.
        assert!(
            start.elapsed() >= Duration::from_millis(150),
            "rate limiting not working: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network_and_limiter() {
        let transport = MockTransport::new()
            .with_response("https://x/a", "a")
            .with_response("https://x/b", "b");
        let client = RateLimitedClient::new(transport, config(300)).with_cache(memory_cache());
        let key_a = CacheKey::submissions(&Cik::parse("1").unwrap());

        let a = FetchRequest::new("https://x/a").cached_as(key_a.clone());
        client.fetch(&a).await.unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        // Hit: served without touching the transport.
        let hit_start = Instant::now();
        assert_eq!(client.fetch(&a).await.unwrap(), "a");
        assert!(hit_start.elapsed() < Duration::from_millis(100));
        assert_eq!(client.inner().call_count("https://x/a"), 1);

        // A miss right after the hit is not delayed by it.
        let miss_start = Instant::now();
        assert_eq!(client.fetch(&FetchRequest::new("https://x/b")).await.unwrap(), "b");
        assert!(
            miss_start.elapsed() < Duration::from_millis(150),
            "miss was delayed by cache hit: {:?}",
            miss_start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let transport = MockTransport::new().with_sequence(
            "https://x/flaky",
            vec![
                Err(FetchError::from_status("https://x/flaky", 503)),
                Err(FetchError::network("https://x/flaky", "connection reset")),
                Ok("finally".to_string()),
            ],
        );
        let client = RateLimitedClient::new(transport, config(0));

        let body = client.fetch(&FetchRequest::new("https://x/flaky")).await.unwrap();
        assert_eq!(body, "finally");
        assert_eq!(client.inner().call_count("https://x/flaky"), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_escalates_to_permanent() {
        let transport = MockTransport::new()
            .with_failure("https://x/down", FetchError::from_status("https://x/down", 502));
        let client = RateLimitedClient::new(transport, config(0));

        let err = client
            .fetch(&FetchRequest::new("https://x/down"))
            .await
            .unwrap_err();
        match err {
            FetchError::Permanent {
                status, attempts, ..
            } => {
                assert_eq!(status, Some(502));
                assert_eq!(attempts, 3);
            }
            other => panic!("expected permanent failure, got {:?}", other),
        }
        assert_eq!(client.inner().call_count("https://x/down"), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let transport = MockTransport::new()
            .with_failure("https://x/gone", FetchError::from_status("https://x/gone", 404));
        let client = RateLimitedClient::new(transport, config(0));

        let err = client
            .fetch(&FetchRequest::new("https://x/gone"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transient());
        assert_eq!(client.inner().call_count("https://x/gone"), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let transport = MockTransport::new().with_sequence(
            "https://x/once",
            vec![
                Err(FetchError::from_status("https://x/once", 404)),
                Ok("later".to_string()),
            ],
        );
        let client = RateLimitedClient::new(transport, config(0)).with_cache(memory_cache());
        let request = FetchRequest::new("https://x/once")
            .cached_as(CacheKey::company_facts(&Cik::parse("2").unwrap()));

        assert!(client.fetch(&request).await.is_err());
        assert_eq!(client.fetch(&request).await.unwrap(), "later");
        assert_eq!(client.fetch(&request).await.unwrap(), "later");
        assert_eq!(client.inner().call_count("https://x/once"), 2);
    }
}
