//! Extractor trait - turns one raw document into normalized records.
//!
//! Extractors are black boxes to the pipeline: any error they return is
//! logged by the caller and treated as "zero records" for the item.

use async_trait::async_trait;

use crate::error::ExtractionResult;
use crate::types::{cik::Cik, record::ExtractedRecord};

/// What kind of document an extractor is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Structured XBRL company facts (JSON)
    CompanyFacts,
    /// Proxy statement (DEF 14A) HTML
    ProxyStatement,
    /// Annual report (10-K) HTML
    AnnualReport,
}

/// A fetched document handed to an extractor.
#[derive(Debug, Clone)]
pub struct Document {
    /// Provenance identifier, copied onto every record
    pub source_id: String,
    pub kind: DocumentKind,
    pub body: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, kind: DocumentKind, body: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            body: body.into(),
        }
    }

    /// The first `max_chars` characters of the body.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.body.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.body[..idx],
            None => &self.body,
        }
    }
}

/// Records plus the extractor's overall confidence in them.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<ExtractedRecord>,

    /// Confidence in `[0, 1]`
    pub confidence: f32,
}

impl Extraction {
    pub fn new(records: Vec<ExtractedRecord>, confidence: f32) -> Self {
        Self {
            records,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Whether this extractor understands `kind`.
    fn accepts(&self, kind: DocumentKind) -> bool;

    /// Extract records for `cik` and `target_year` from `document`.
    async fn extract(
        &self,
        document: &Document,
        cik: &Cik,
        target_year: i32,
    ) -> ExtractionResult<Extraction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let doc = Document::new("d", DocumentKind::ProxyStatement, "héllo wörld");
        assert_eq!(doc.excerpt(4), "héll");
        assert_eq!(doc.excerpt(100), "héllo wörld");
    }
}
