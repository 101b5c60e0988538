//! reqwest-backed transport.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::traits::transport::Transport;
use crate::types::config::FetchConfig;

/// Plain HTTP GET transport. Classifies failures; no pacing, no retries.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport from fetch configuration.
    pub fn new(config: &FetchConfig) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Permanent {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
                status: None,
                attempts: 0,
            })?;
        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> FetchResult<String> {
        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url, status.as_u16()));
        }

        response.text().await.map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if let Some(status) = error.status() {
        return FetchError::from_status(url, status.as_u16());
    }
    if error.is_builder() || error.is_redirect() {
        return FetchError::Permanent {
            url: url.to_string(),
            reason: error.to_string(),
            status: None,
            attempts: 1,
        };
    }
    // Timeouts, connect failures and truncated bodies are worth retrying.
    FetchError::network(url, error.to_string())
}
