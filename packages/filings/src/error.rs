//! Typed errors for the filings pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors returned by the fetch path (transport and rate-limited client).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network error, 5xx, timeout or rate-limit response. Retried by the client.
    #[error("transient failure fetching {url}: {reason}")]
    Transient {
        url: String,
        reason: String,
        status: Option<u16>,
    },

    /// Non-retryable HTTP error, or retries exhausted.
    #[error("permanent failure fetching {url} after {attempts} attempt(s): {reason}")]
    Permanent {
        url: String,
        reason: String,
        status: Option<u16>,
        attempts: u32,
    },
}

impl FetchError {
    /// Classify an HTTP status code returned for `url`.
    ///
    /// 5xx and 429 are transient, every other status is permanent.
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        let reason = format!("HTTP {}", status);
        if status >= 500 || status == 429 {
            FetchError::Transient {
                url,
                reason,
                status: Some(status),
            }
        } else {
            FetchError::Permanent {
                url,
                reason,
                status: Some(status),
                attempts: 1,
            }
        }
    }

    /// Network-level failure (connection refused, reset, DNS).
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Transient {
            url: url.into(),
            reason: reason.into(),
            status: None,
        }
    }

    /// Whether the client should retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transient { status, .. } | FetchError::Permanent { status, .. } => *status,
        }
    }

    /// Escalate to a permanent failure after `attempts` tries.
    pub fn into_permanent(self, attempts: u32) -> Self {
        match self {
            FetchError::Transient {
                url,
                reason,
                status,
            } => FetchError::Permanent {
                url,
                reason,
                status,
                attempts,
            },
            permanent => permanent,
        }
    }
}

/// Cache backend I/O failures.
///
/// Decode failures never surface here: a corrupted entry is a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Checkpoint store failures.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The store could not be written. Fatal for a run.
    #[error("checkpoint store unwritable at {path}: {source}")]
    Unwritable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A result was recorded for a company outside the run's company list.
    #[error("company {cik} is not part of analysis {analysis_id}")]
    UnknownCompany { analysis_id: String, cik: String },

    /// Persisted state violates a checkpoint invariant.
    #[error("invalid checkpoint: {0}")]
    Invalid(String),
}

/// Company identifier parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CikError {
    #[error("empty company identifier")]
    Empty,

    #[error("company identifier contains non-digit characters: {0:?}")]
    NonNumeric(String),

    #[error("company identifier longer than 10 digits: {0:?}")]
    TooLong(String),
}

/// Monetary field validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("monetary amount must be non-negative, got {0}")]
    NegativeAmount(String),
}

/// Failures inside an extraction function.
///
/// Callers treat these as "zero records" for the item.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document could not be parsed: {0}")]
    Parse(String),

    #[error("no matching data for fiscal year {year}")]
    NoData { year: i32 },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// LLM review service unavailable or returned garbage
    #[error("review service error: {0}")]
    Review(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Failures while analyzing one work item. Recorded as item failures.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed API response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Run-level failures. Only checkpoint persistence is fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("invalid run request: {reason}")]
    InvalidRequest { reason: String },

    #[error("checkpoint {analysis_id} for {target_year} not found")]
    ResumeTargetMissing {
        analysis_id: String,
        target_year: i32,
    },
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for checkpoint operations.
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Result type alias for extraction operations.
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(FetchError::from_status("u", 500).is_transient());
        assert!(FetchError::from_status("u", 503).is_transient());
        assert!(FetchError::from_status("u", 429).is_transient());
        assert!(!FetchError::from_status("u", 404).is_transient());
        assert!(!FetchError::from_status("u", 403).is_transient());
    }

    #[test]
    fn test_into_permanent_keeps_last_error() {
        let err = FetchError::from_status("https://x", 502).into_permanent(4);
        match err {
            FetchError::Permanent {
                status, attempts, ..
            } => {
                assert_eq!(status, Some(502));
                assert_eq!(attempts, 4);
            }
            other => panic!("expected permanent, got {:?}", other),
        }
    }
}
