//! Tax expense extraction from structured XBRL company facts.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ExtractionError, ExtractionResult};
use crate::traits::extractor::{Document, DocumentKind, Extraction, Extractor};
use crate::types::{
    cik::Cik,
    filing::{CompanyFacts, FactValue},
    record::{Amount, ExtractedRecord, RecordFacts, TaxExpense},
};

const TAXONOMY: &str = "us-gaap";
const UNIT: &str = "USD";

const TOTAL_CONCEPT: &str = "IncomeTaxExpenseBenefit";
const CURRENT_CONCEPT: &str = "CurrentIncomeTaxExpenseBenefit";
const DEFERRED_CONCEPT: &str = "DeferredIncomeTaxExpenseBenefit";

/// Reads income tax expense for a fiscal year out of company facts.
///
/// Only annual values reported on annual forms count. When a value was
/// reported more than once (comparatives, restatements) the latest filing
/// wins. Negative values (tax benefits) are treated as absent.
#[derive(Debug, Clone, Default)]
pub struct CompanyFactsTaxExtractor;

impl CompanyFactsTaxExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Tax expense for `target_year`, or `None` if nothing was reported.
    pub fn tax_expense(facts: &CompanyFacts, target_year: i32) -> Option<(TaxExpense, String)> {
        let total = annual_value(facts, TOTAL_CONCEPT, target_year);
        let current = annual_value(facts, CURRENT_CONCEPT, target_year);
        let deferred = annual_value(facts, DEFERRED_CONCEPT, target_year);

        // Provenance is the filing that reported the headline figure.
        let source = [&total, &current, &deferred]
            .into_iter()
            .flatten()
            .next()
            .map(|v| v.accn.clone())?;

        let expense = TaxExpense {
            total: total.and_then(|v| Amount::non_negative(v.val)),
            current: current.and_then(|v| Amount::non_negative(v.val)),
            deferred: deferred.and_then(|v| Amount::non_negative(v.val)),
        };
        Some((expense, source))
    }
}

fn annual_value<'a>(facts: &'a CompanyFacts, concept: &str, target_year: i32) -> Option<&'a FactValue> {
    facts
        .concept(TAXONOMY, concept)?
        .units
        .get(UNIT)?
        .iter()
        .filter(|v| v.form.starts_with("10-K"))
        .filter(|v| v.is_annual())
        .filter(|v| chrono::Datelike::year(&v.end) == target_year)
        .max_by_key(|v| v.filed)
}

#[async_trait]
impl Extractor for CompanyFactsTaxExtractor {
    fn accepts(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::CompanyFacts
    }

    async fn extract(
        &self,
        document: &Document,
        cik: &Cik,
        target_year: i32,
    ) -> ExtractionResult<Extraction> {
        let facts: CompanyFacts = serde_json::from_str(&document.body)?;

        let (expense, accession) =
            Self::tax_expense(&facts, target_year).ok_or(ExtractionError::NoData { year: target_year })?;
        if expense.is_empty() {
            return Err(ExtractionError::NoData { year: target_year });
        }

        // A reported total is the strongest signal; components alone are weaker.
        let confidence = if expense.total.is_some() { 0.95 } else { 0.6 };
        debug!(
            cik = %cik,
            target_year,
            accession = %accession,
            total = ?expense.total,
            "extracted tax expense"
        );

        let record = ExtractedRecord::new(
            cik.clone(),
            target_year,
            RecordFacts::TaxExpense(expense),
            format!("{}#{}", document.source_id, accession),
        )
        .with_confidence(confidence);
        Ok(Extraction::new(vec![record], confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn facts_json() -> String {
        serde_json::json!({
            "cik": 320193,
            "entityName": "Apple Inc.",
            "facts": {
                "us-gaap": {
                    "IncomeTaxExpenseBenefit": {
                        "label": "Income Tax Expense (Benefit)",
                        "units": {
                            "USD": [
                                // Original 2023 figure, restated in the 2024 10-K.
                                {"start": "2022-09-25", "end": "2023-09-30", "val": 16741000000u64,
                                 "accn": "0000320193-23-000106", "fy": 2023, "fp": "FY",
                                 "form": "10-K", "filed": "2023-11-03"},
                                {"start": "2022-09-25", "end": "2023-09-30", "val": 16800000000u64,
                                 "accn": "0000320193-24-000123", "fy": 2024, "fp": "FY",
                                 "form": "10-K", "filed": "2024-11-01"},
                                // Quarterly value must be ignored.
                                {"start": "2023-07-02", "end": "2023-09-30", "val": 2956000000u64,
                                 "accn": "0000320193-23-000106", "fy": 2023, "fp": "FY",
                                 "form": "10-K", "filed": "2023-11-03"}
                            ]
                        }
                    },
                    "DeferredIncomeTaxExpenseBenefit": {
                        "units": {
                            "USD": [
                                {"start": "2022-09-25", "end": "2023-09-30", "val": -6223000000i64,
                                 "accn": "0000320193-23-000106", "fy": 2023, "fp": "FY",
                                 "form": "10-K", "filed": "2023-11-03"}
                            ]
                        }
                    }
                }
            }
        })
        .to_string()
    }

    fn document() -> Document {
        Document::new("companyfacts:0000320193", DocumentKind::CompanyFacts, facts_json())
    }

    #[tokio::test]
    async fn test_latest_annual_filing_wins() {
        let cik = Cik::parse("320193").unwrap();
        let extraction = CompanyFactsTaxExtractor::new()
            .extract(&document(), &cik, 2023)
            .await
            .unwrap();

        assert_eq!(extraction.records.len(), 1);
        let record = &extraction.records[0];
        let tax = record.tax_expense().unwrap();
        assert_eq!(
            tax.total.map(|a| a.value()),
            Some(Decimal::from(16_800_000_000u64))
        );
        assert!(record.source_document.ends_with("0000320193-24-000123"));
        assert!(extraction.confidence > 0.9);
    }

    #[tokio::test]
    async fn test_negative_values_are_absent() {
        let cik = Cik::parse("320193").unwrap();
        let extraction = CompanyFactsTaxExtractor::new()
            .extract(&document(), &cik, 2023)
            .await
            .unwrap();
        let tax = extraction.records[0].tax_expense().unwrap();
        assert!(tax.deferred.is_none());
        assert!(tax.current.is_none());
    }

    #[tokio::test]
    async fn test_missing_year_is_no_data() {
        let cik = Cik::parse("320193").unwrap();
        let err = CompanyFactsTaxExtractor::new()
            .extract(&document(), &cik, 2019)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoData { year: 2019 }));
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let cik = Cik::parse("1").unwrap();
        let doc = Document::new("x", DocumentKind::CompanyFacts, "not json");
        let err = CompanyFactsTaxExtractor::new()
            .extract(&doc, &cik, 2023)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::JsonParse(_)));
    }
}
