//! Per-company analysis: the worker the batch processor drives.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::filings::FilingsClient;
use crate::error::{AnalyzeError, FetchError};
use crate::extractors::{CompanyFactsTaxExtractor, CompensationTableExtractor, ReviewingExtractor};
use crate::stores::cache::CacheKey;
use crate::traits::{
    extractor::{Document, DocumentKind, Extractor},
    reviewer::RecordReviewer,
    transport::Transport,
    worker::CompanyWorker,
};
use crate::types::{cik::Cik, config::ReviewConfig, record::ExtractedRecord};

/// The standard extractor set: XBRL tax expense plus compensation tables,
/// the latter reviewed by `reviewer` when one is given.
pub fn default_extractors(
    reviewer: Option<Arc<dyn RecordReviewer>>,
    review: ReviewConfig,
) -> Vec<Arc<dyn Extractor>> {
    let mut compensation = ReviewingExtractor::new(CompensationTableExtractor::new(), review);
    if let Some(reviewer) = reviewer {
        compensation = compensation.with_reviewer(reviewer);
    }
    vec![
        Arc::new(CompanyFactsTaxExtractor::new()),
        Arc::new(compensation),
    ]
}

/// Collects every record for one company and fiscal year.
///
/// Flow:
/// 1. Derived-facts cache, keyed by company and year
/// 2. Company facts -> extractors accepting [`DocumentKind::CompanyFacts`]
/// 3. Submissions -> proxy statement for the year -> proxy extractors
/// 4. Non-empty results are written back to the derived-facts cache
///
/// Extraction failures count as zero records. Fetch failures fail the
/// item, except a 404, which means the document does not exist.
pub struct CompanyAnalyzer<T: Transport> {
    client: Arc<FilingsClient<T>>,
    extractors: Vec<Arc<dyn Extractor>>,
}

impl<T: Transport> CompanyAnalyzer<T> {
    pub fn new(client: Arc<FilingsClient<T>>, extractors: Vec<Arc<dyn Extractor>>) -> Self {
        Self { client, extractors }
    }

    pub fn client(&self) -> &FilingsClient<T> {
        &self.client
    }

    async fn extract_all(&self, document: &Document, cik: &Cik, year: i32) -> Vec<ExtractedRecord> {
        let mut records = Vec::new();
        for extractor in self.extractors.iter().filter(|e| e.accepts(document.kind)) {
            match extractor.extract(document, cik, year).await {
                Ok(extraction) => records.extend(extraction.records),
                Err(e) => {
                    debug!(
                        cik = %cik,
                        year,
                        document = %document.source_id,
                        error = %e,
                        "extraction yielded no records"
                    );
                }
            }
        }
        records
    }

    async fn company_facts_records(&self, cik: &Cik, year: i32) -> Result<Vec<ExtractedRecord>, AnalyzeError> {
        let Some(body) = absent_on_404(self.client.company_facts_raw(cik).await)? else {
            debug!(cik = %cik, "no structured facts published");
            return Ok(Vec::new());
        };
        let document = Document::new(
            CacheKey::company_facts(cik).as_str(),
            DocumentKind::CompanyFacts,
            body,
        );
        Ok(self.extract_all(&document, cik, year).await)
    }

    async fn proxy_records(&self, cik: &Cik, year: i32) -> Result<Vec<ExtractedRecord>, AnalyzeError> {
        let submissions = self.client.submissions(cik).await?;
        let Some(filing) = submissions.filings.recent.proxy_statement_for(year) else {
            debug!(cik = %cik, year, "no proxy statement on file");
            return Ok(Vec::new());
        };

        let Some(body) = absent_on_404(self.client.filing_document(cik, &filing).await)? else {
            warn!(cik = %cik, accession = %filing.accession_number, "proxy statement listed but missing");
            return Ok(Vec::new());
        };
        let document = Document::new(filing.document_id(), DocumentKind::ProxyStatement, body);
        Ok(self.extract_all(&document, cik, year).await)
    }
}

#[async_trait]
impl<T: Transport> CompanyWorker for CompanyAnalyzer<T> {
    async fn analyze(&self, cik: &Cik, fiscal_year: i32) -> Result<Vec<ExtractedRecord>, AnalyzeError> {
        let cache = self.client.client().cache();
        let derived_key = CacheKey::derived(cik, fiscal_year);

        if let Some(cache) = cache {
            if let Some(records) = cache.get_json::<Vec<ExtractedRecord>>(&derived_key).await {
                debug!(cik = %cik, fiscal_year, records = records.len(), "derived facts cached");
                return Ok(records);
            }
        }

        let mut records = self.company_facts_records(cik, fiscal_year).await?;
        records.extend(self.proxy_records(cik, fiscal_year).await?);

        info!(cik = %cik, fiscal_year, records = records.len(), "company analyzed");

        if let Some(cache) = cache {
            if !records.is_empty() {
                if let Err(e) = cache.put_json(&derived_key, &records).await {
                    warn!(key = %derived_key, error = %e, "failed to cache derived facts");
                }
            }
        }

        Ok(records)
    }
}

/// A 404 means the document does not exist, which is not a failure.
fn absent_on_404(result: Result<String, FetchError>) -> Result<Option<String>, FetchError> {
    match result {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.status() == Some(404) => Ok(None),
        Err(e) => Err(e),
    }
}
