use anyhow::{Context, Result};
use dotenvy::dotenv;
use filings::{
    BatchConfig, CacheConfig, FetchConfig, PipelineConfig, ResumePolicy, ReviewConfig,
};
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// CLI configuration loaded from environment variables
#[derive(Debug)]
pub struct Config {
    /// Required for anything that talks to the filings API
    pub user_agent: Option<String>,
    pub data_dir: PathBuf,
    pub pipeline: PipelineConfig,

    /// Enables the LLM review pass when set
    pub openai_api_key: Option<SecretString>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let user_agent = env::var("FILINGS_USER_AGENT")
            .ok()
            .filter(|ua| !ua.trim().is_empty());

        let mut fetch = FetchConfig::default()
            .with_request_delay_ms(parse_or("FILINGS_REQUEST_DELAY_MS", 100)?)
            .with_max_retries(parse_or("FILINGS_MAX_RETRIES", 3)?)
            .with_retry_base_ms(parse_or("FILINGS_RETRY_BASE_MS", 500)?);
        if let Some(user_agent) = &user_agent {
            fetch = fetch.with_user_agent(user_agent);
        }

        let cache = CacheConfig::default().with_enabled(parse_or("FILINGS_CACHE_ENABLED", true)?);

        let batch =
            BatchConfig::default().with_max_concurrency(parse_or("FILINGS_MAX_CONCURRENCY", 5)?);

        let resume = ResumePolicy::default()
            .with_max_age_hours(parse_or("FILINGS_CHECKPOINT_MAX_AGE_HOURS", 24)?);

        let review = ReviewConfig {
            model: env::var("FILINGS_REVIEW_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ..Default::default()
        };

        Ok(Self {
            user_agent,
            data_dir: env::var("FILINGS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            pipeline: PipelineConfig {
                fetch,
                cache,
                batch,
                resume,
                review,
            },
            openai_api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty())
                .map(SecretString::from),
        })
    }

    /// Fail unless a User-Agent was configured. The filings API blocks
    /// anonymous clients.
    pub fn require_user_agent(&self) -> Result<&str> {
        self.user_agent
            .as_deref()
            .context("FILINGS_USER_AGENT must be set (e.g. \"Jane Doe jane@example.com\")")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}
