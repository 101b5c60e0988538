//! Record reviewer trait - the optional LLM disambiguation pass.

use async_trait::async_trait;

use crate::error::ExtractionResult;
use crate::traits::extractor::Document;
use crate::types::{cik::Cik, record::ExtractedRecord};

/// Revises low-confidence extractions against the source document.
///
/// Implementations wrap specific LLM providers and handle prompting and
/// response parsing.
#[async_trait]
pub trait RecordReviewer: Send + Sync {
    /// Return revised records for `cik` and `target_year`.
    ///
    /// `excerpt` is a bounded slice of the source document; `draft` holds the
    /// records the heuristic extractor produced (possibly none).
    async fn review(
        &self,
        document: &Document,
        cik: &Cik,
        excerpt: &str,
        draft: &[ExtractedRecord],
        target_year: i32,
    ) -> ExtractionResult<Vec<ExtractedRecord>>;
}
