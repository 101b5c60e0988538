//! Company worker trait - full analysis of one work item.

use async_trait::async_trait;

use crate::error::AnalyzeError;
use crate::types::{cik::Cik, record::ExtractedRecord};

/// Produces every record for one company and fiscal year.
///
/// An `Err` is a terminal failure for the item; an empty `Ok` means the
/// filings held no data.
#[async_trait]
pub trait CompanyWorker: Send + Sync {
    async fn analyze(&self, cik: &Cik, fiscal_year: i32)
        -> Result<Vec<ExtractedRecord>, AnalyzeError>;
}

#[async_trait]
impl<T: CompanyWorker + ?Sized> CompanyWorker for std::sync::Arc<T> {
    async fn analyze(
        &self,
        cik: &Cik,
        fiscal_year: i32,
    ) -> Result<Vec<ExtractedRecord>, AnalyzeError> {
        (**self).analyze(cik, fiscal_year).await
    }
}
