//! Low-confidence review wrapper.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ExtractionResult;
use crate::traits::extractor::{Document, DocumentKind, Extraction, Extractor};
use crate::traits::reviewer::RecordReviewer;
use crate::types::{cik::Cik, config::ReviewConfig};

/// Wraps an extractor and sends its low-confidence output to a reviewer.
///
/// Extractions at or above the configured threshold pass through untouched.
/// A reviewer failure, or a review that comes back empty, keeps the
/// original records.
pub struct ReviewingExtractor<E: Extractor> {
    inner: E,
    reviewer: Option<Arc<dyn RecordReviewer>>,
    config: ReviewConfig,
}

impl<E: Extractor> ReviewingExtractor<E> {
    pub fn new(inner: E, config: ReviewConfig) -> Self {
        Self {
            inner,
            reviewer: None,
            config,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn RecordReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Extractor> Extractor for ReviewingExtractor<E> {
    fn accepts(&self, kind: DocumentKind) -> bool {
        self.inner.accepts(kind)
    }

    async fn extract(
        &self,
        document: &Document,
        cik: &Cik,
        target_year: i32,
    ) -> ExtractionResult<Extraction> {
        let draft = self.inner.extract(document, cik, target_year).await?;

        let Some(reviewer) = &self.reviewer else {
            return Ok(draft);
        };
        if draft.confidence >= self.config.confidence_threshold {
            return Ok(draft);
        }

        debug!(
            cik = %cik,
            target_year,
            confidence = draft.confidence,
            threshold = self.config.confidence_threshold,
            "sending low-confidence extraction for review"
        );

        let excerpt = document.excerpt(self.config.max_excerpt_chars);
        let reviewed = match reviewer
            .review(document, cik, excerpt, &draft.records, target_year)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(cik = %cik, target_year, error = %e, "review failed, keeping draft");
                return Ok(draft);
            }
        };

        // Reviewers only get to revise this company's target year.
        let reviewed: Vec<_> = reviewed
            .into_iter()
            .filter(|r| &r.cik == cik && r.fiscal_year == target_year)
            .map(|mut r| {
                r.confidence.get_or_insert(self.config.confidence_threshold);
                r
            })
            .collect();

        if reviewed.is_empty() {
            debug!(cik = %cik, target_year, "review returned nothing usable, keeping draft");
            return Ok(draft);
        }

        Ok(Extraction::new(reviewed, self.config.confidence_threshold))
    }
}
