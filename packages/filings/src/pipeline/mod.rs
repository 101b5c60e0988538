//! Pipeline components.
//!
//! - `BatchProcessor` - bounded-concurrency, paced batch execution
//! - `ResumeAdvisor` - decides whether a run resumes a stored checkpoint
//! - `CompanyAnalyzer` - fetch and extract everything for one company-year
//! - `AnalysisRunner` - checkpointed run over a company list

pub mod analyzer;
pub mod batch;
pub mod resume;
pub mod runner;

pub use analyzer::{default_extractors, CompanyAnalyzer};
pub use batch::{BatchProcessor, BatchProgress, BatchRunStatus, BatchSummary, ItemOutcome, OutcomeSink};
pub use resume::{ResumeAction, ResumeAdvisor, ResumeDecision, SuggestKind};
pub use runner::{AnalysisRunner, CompanyYear, RunOutcome, RunReport, RunRequest};
