//! Filings API client.
//!
//! Thin typed layer over [`RateLimitedClient`]: builds URLs and cache keys
//! from a normalized [`Cik`] and decodes the JSON documents.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::client::rate_limited::{FetchRequest, RateLimitedClient};
use crate::error::{AnalyzeError, FetchResult};
use crate::stores::cache::CacheKey;
use crate::traits::transport::Transport;
use crate::types::{
    cik::Cik,
    filing::{CompanyFacts, FilingRef, Submissions},
};

const DATA_BASE_URL: &str = "https://data.sec.gov";
const ARCHIVES_BASE_URL: &str = "https://www.sec.gov/Archives/edgar/data";

pub struct FilingsClient<T: Transport> {
    client: RateLimitedClient<T>,
    data_base_url: String,
    archives_base_url: String,
}

impl<T: Transport> FilingsClient<T> {
    pub fn new(client: RateLimitedClient<T>) -> Self {
        Self {
            client,
            data_base_url: DATA_BASE_URL.to_string(),
            archives_base_url: ARCHIVES_BASE_URL.to_string(),
        }
    }

    /// Point at a different host (mirrors, tests).
    pub fn with_base_urls(mut self, data: impl Into<String>, archives: impl Into<String>) -> Self {
        self.data_base_url = data.into();
        self.archives_base_url = archives.into();
        self
    }

    pub fn client(&self) -> &RateLimitedClient<T> {
        &self.client
    }

    pub fn submissions_url(&self, cik: &Cik) -> String {
        format!("{}/submissions/CIK{}.json", self.data_base_url, cik)
    }

    pub fn company_facts_url(&self, cik: &Cik) -> String {
        format!("{}/api/xbrl/companyfacts/CIK{}.json", self.data_base_url, cik)
    }

    /// Archive URL of a filing's primary document.
    pub fn filing_document_url(&self, cik: &Cik, filing: &FilingRef) -> String {
        format!(
            "{}/{}/{}/{}",
            self.archives_base_url,
            cik.unpadded(),
            filing.accession_number.replace('-', ""),
            filing.primary_document
        )
    }

    /// Submission history for a company.
    pub async fn submissions(&self, cik: &Cik) -> Result<Submissions, AnalyzeError> {
        let request =
            FetchRequest::new(self.submissions_url(cik)).cached_as(CacheKey::submissions(cik));
        self.fetch_json(&request).await
    }

    /// Raw structured-facts document for a company.
    pub async fn company_facts_raw(&self, cik: &Cik) -> FetchResult<String> {
        let request =
            FetchRequest::new(self.company_facts_url(cik)).cached_as(CacheKey::company_facts(cik));
        self.client.fetch(&request).await
    }

    /// Structured XBRL facts for a company.
    pub async fn company_facts(&self, cik: &Cik) -> Result<CompanyFacts, AnalyzeError> {
        let request =
            FetchRequest::new(self.company_facts_url(cik)).cached_as(CacheKey::company_facts(cik));
        self.fetch_json(&request).await
    }

    /// Primary document of a filing.
    pub async fn filing_document(&self, cik: &Cik, filing: &FilingRef) -> FetchResult<String> {
        let url = self.filing_document_url(cik, filing);
        debug!(cik = %cik, form = %filing.form, url = %url, "fetching filing document");
        let request = FetchRequest::new(url).cached_as(CacheKey::filing_document(
            cik,
            &filing.accession_number,
            &filing.primary_document,
        ));
        self.client.fetch(&request).await
    }

    /// Fetch and decode a JSON document. A body that does not decode is
    /// evicted so the next attempt goes back to the network.
    async fn fetch_json<D: DeserializeOwned>(
        &self,
        request: &FetchRequest,
    ) -> Result<D, AnalyzeError> {
        let body = self.client.fetch(request).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                if let (Some(cache), Some(key)) = (self.client.cache(), &request.cache_key) {
                    if let Err(evict) = cache.delete(key).await {
                        warn!(key = %key, error = %evict, "failed to evict undecodable response");
                    }
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::stores::{cache::Cache, memory::MemoryCacheBackend};
    use crate::testing::MockTransport;
    use crate::types::config::{CacheConfig, FetchConfig};
    use std::sync::Arc;

    fn client(transport: MockTransport) -> FilingsClient<MockTransport> {
        FilingsClient::new(RateLimitedClient::new(
            transport,
            FetchConfig::default().with_request_delay_ms(0),
        ))
    }

    #[test]
    fn test_urls_use_normalized_identifier() {
        let c = client(MockTransport::new());
        let cik = Cik::parse("320193").unwrap();
        assert_eq!(
            c.submissions_url(&cik),
            "https://data.sec.gov/submissions/CIK0000320193.json"
        );
        assert_eq!(
            c.company_facts_url(&cik),
            "https://data.sec.gov/api/xbrl/companyfacts/CIK0000320193.json"
        );

        let filing = FilingRef {
            accession_number: "0001308179-24-000010".into(),
            filing_date: None,
            report_date: None,
            form: "DEF 14A".into(),
            primary_document: "aapl4359751-def14a.htm".into(),
        };
        assert_eq!(
            c.filing_document_url(&cik, &filing),
            "https://www.sec.gov/Archives/edgar/data/320193/000130817924000010/aapl4359751-def14a.htm"
        );
    }

    #[tokio::test]
    async fn test_submissions_decode() {
        let cik = Cik::parse("320193").unwrap();
        let transport = MockTransport::new().with_response(
            "https://data.sec.gov/submissions/CIK0000320193.json",
            r#"{"cik":"320193","name":"Apple Inc.","filings":{"recent":{
                "accessionNumber":["0001308179-24-000010"],
                "filingDate":["2024-01-11"],
                "reportDate":[""],
                "form":["DEF 14A"],
                "primaryDocument":["aapl4359751-def14a.htm"]}}}"#,
        );
        let submissions = client(transport).submissions(&cik).await.unwrap();
        assert_eq!(submissions.name, "Apple Inc.");
        assert!(submissions.filings.recent.proxy_statement_for(2023).is_some());
    }

    #[tokio::test]
    async fn test_malformed_json_is_reported() {
        let cik = Cik::parse("1").unwrap();
        let transport = MockTransport::new()
            .with_response("https://data.sec.gov/submissions/CIK0000000001.json", "<html>");
        let err = client(transport).submissions(&cik).await.unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_undecodable_response_is_not_kept_in_cache() {
        let url = "https://data.sec.gov/submissions/CIK0000000001.json";
        let cik = Cik::parse("1").unwrap();
        let transport = Arc::new(MockTransport::new().with_sequence(
            url,
            vec![
                Ok("<html>maintenance</html>".to_string()),
                Ok(r#"{"cik":"1","name":"Recovered Corp","filings":{"recent":{}}}"#.to_string()),
            ],
        ));
        let cache = Arc::new(Cache::new(
            Arc::new(MemoryCacheBackend::new()),
            Arc::new(SystemClock),
            CacheConfig::default(),
        ));
        let client = FilingsClient::new(
            RateLimitedClient::new(
                transport.clone(),
                FetchConfig::default().with_request_delay_ms(0),
            )
            .with_cache(cache),
        );

        let err = client.submissions(&cik).await.unwrap_err();
        assert!(matches!(err, AnalyzeError::MalformedResponse(_)));

        let recovered = client.submissions(&cik).await.unwrap();
        assert_eq!(recovered.name, "Recovered Corp");
        assert_eq!(transport.call_count(url), 2);

        // The good body is cached from here on.
        client.submissions(&cik).await.unwrap();
        assert_eq!(transport.call_count(url), 2);
    }
}
