//! Configuration types for fetching, caching, batching and resuming.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub resume: ResumePolicy,
    #[serde(default)]
    pub review: ReviewConfig,
}

/// Configuration for the rate-limited fetch client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header. The filings API rejects anonymous clients.
    pub user_agent: String,

    /// Minimum interval between outbound requests, process-wide.
    ///
    /// Default: 100ms (10 requests per second).
    pub request_delay_ms: u64,

    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,

    /// Backoff base: attempt `n` waits `base * 2^n`.
    pub retry_base_ms: u64,

    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "filings-pipeline/0.1 (contact@example.com)".to_string(),
            request_delay_ms: 100,
            max_retries: 3,
            retry_base_ms: 500,
            timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_request_delay_ms(mut self, ms: u64) -> Self {
        self.request_delay_ms = ms;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_base_ms(mut self, ms: u64) -> Self {
        self.retry_base_ms = ms;
        self
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.retry_base_ms.saturating_mul(factor))
    }
}

/// Configuration for the cache store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Global toggle. Disabled caches miss on every read and ignore writes.
    pub enabled: bool,

    /// TTL for submission histories, in seconds. `<= 0` never expires.
    pub submissions_ttl_secs: i64,

    /// TTL for structured company facts.
    pub company_facts_ttl_secs: i64,

    /// TTL for filing documents. Filed documents are immutable.
    pub filing_document_ttl_secs: i64,

    /// TTL for derived per-company records.
    pub derived_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            submissions_ttl_secs: 24 * 3600,
            company_facts_ttl_secs: 7 * 24 * 3600,
            filing_document_ttl_secs: 0,
            derived_ttl_secs: 30 * 24 * 3600,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Configuration for the parallel batch processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Items per batch. `None` derives it from the item count.
    pub batch_size: Option<usize>,

    /// Maximum simultaneously in-flight workers, independent of batch size.
    pub max_concurrency: usize,

    /// Pacing delay before each worker invocation.
    pub item_delay_ms: u64,

    /// Pause between batches.
    pub batch_delay_ms: u64,

    /// Per-item deadline. `None` relies on fetch timeouts and retry limits.
    pub item_timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            max_concurrency: 5,
            item_delay_ms: 100,
            batch_delay_ms: 1000,
            item_timeout_secs: None,
        }
    }
}

impl BatchConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size.max(1));
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_item_delay_ms(mut self, ms: u64) -> Self {
        self.item_delay_ms = ms;
        self
    }

    pub fn with_batch_delay_ms(mut self, ms: u64) -> Self {
        self.batch_delay_ms = ms;
        self
    }

    pub fn with_item_timeout_secs(mut self, secs: u64) -> Self {
        self.item_timeout_secs = Some(secs);
        self
    }

    /// Batch size for `item_count` items.
    pub fn batch_size_for(&self, item_count: usize) -> usize {
        if let Some(size) = self.batch_size {
            return size.max(1);
        }
        match item_count {
            0..=10 => item_count.max(1),
            11..=100 => 10,
            _ => 25,
        }
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout_secs.map(Duration::from_secs)
    }
}

/// Thresholds for the auto-resume decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePolicy {
    /// Checkpoints not updated within this window are ignored.
    pub max_age_hours: i64,

    /// Incomplete runs above this progress may auto-resume...
    pub auto_resume_min_progress: f64,

    /// ...when their company count is within this fraction of the request.
    pub auto_resume_count_tolerance: f64,

    /// Incomplete runs above this progress are suggested regardless of count.
    pub suggest_min_progress: f64,

    /// Completed runs updated within this window may be suggested for rerun...
    pub rerun_window_hours: i64,

    /// ...when their company count is within this fraction of the request.
    pub rerun_count_tolerance: f64,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            auto_resume_min_progress: 10.0,
            auto_resume_count_tolerance: 0.20,
            suggest_min_progress: 50.0,
            rerun_window_hours: 6,
            rerun_count_tolerance: 0.10,
        }
    }
}

impl ResumePolicy {
    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age_hours = hours;
        self
    }
}

/// Configuration for the LLM review pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Records below this confidence are sent for review.
    pub confidence_threshold: f32,

    /// Characters of the source document included in the review prompt.
    pub max_excerpt_chars: usize,

    pub model: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_excerpt_chars: 12_000,
            model: "gpt-4o-mini".to_string(),
        }
    }
}
