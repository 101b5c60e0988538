//! Extraction functions.
//!
//! Each extractor turns one fetched document into normalized records:
//! - [`CompanyFactsTaxExtractor`] reads tax expense from XBRL company facts
//! - [`CompensationTableExtractor`] parses proxy statement compensation tables
//! - [`ReviewingExtractor`] sends low-confidence output to an LLM reviewer

pub mod company_facts;
pub mod compensation;
pub mod openai;
pub mod reviewing;

pub use company_facts::CompanyFactsTaxExtractor;
pub use compensation::CompensationTableExtractor;
pub use openai::OpenAiReviewer;
pub use reviewing::ReviewingExtractor;
