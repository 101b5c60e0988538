//! Resumable Filings Extraction Pipeline
//!
//! Pulls financial and governance facts (income tax expense, executive
//! compensation) out of public regulatory filings for a list of companies
//! and a fiscal year, without getting blocked by the filings API and without
//! losing work when a long run dies halfway.
//!
//! # Design Philosophy
//!
//! - Every outbound request goes through one paced, retrying client
//! - Fetched documents are cached on disk with per-category expiry
//! - Progress is checkpointed after every company, atomically
//! - A new run picks up a compatible unfinished run on its own
//! - One bad company never sinks the batch
//!
//! # Usage
//!
//! ```rust,ignore
//! use filings::{AnalysisRunner, CompanyAnalyzer, FilingsClient, RunRequest};
//!
//! let client = RateLimitedClient::new(HttpTransport::new(&config.fetch)?, config.fetch.clone())
//!     .with_cache(cache);
//! let analyzer = CompanyAnalyzer::new(
//!     Arc::new(FilingsClient::new(client)),
//!     default_extractors(None, config.review.clone()),
//! );
//! let runner = AnalysisRunner::new(Arc::new(analyzer), store, &config, system_clock());
//!
//! let report = runner
//!     .run(RunRequest::new(2023, companies), CancellationToken::new())
//!     .await?;
//! println!("{}", report.run_stats);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Transport, CacheBackend, CheckpointStore, Extractor)
//! - [`types`] - Company ids, records, checkpoints, configuration
//! - [`client`] - Rate-limited fetch client and the typed filings API
//! - [`stores`] - Cache and checkpoint storage (memory, files)
//! - [`extractors`] - Tax expense and compensation table extraction
//! - [`pipeline`] - Batch processing, resume decisions, the analysis runner
//! - [`clock`] - Time source, swappable in tests
//! - [`testing`] - Mock implementations for testing

pub mod client;
pub mod clock;
pub mod error;
pub mod extractors;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use clock::{system_clock, Clock, SystemClock};
pub use error::{
    AnalyzeError, CacheError, CheckpointError, CikError, ExtractionError, FetchError,
    PipelineError, RecordError,
};
pub use traits::{
    cache::CacheBackend,
    checkpoint::CheckpointStore,
    extractor::{Document, DocumentKind, Extraction, Extractor},
    reviewer::RecordReviewer,
    transport::Transport,
    worker::CompanyWorker,
};
pub use types::{
    checkpoint::{AnalysisId, Checkpoint, CheckpointSummary, CompanyOutcome, RunStats},
    cik::Cik,
    config::{BatchConfig, CacheConfig, FetchConfig, PipelineConfig, ResumePolicy, ReviewConfig},
    record::{Amount, ExecutiveCompensation, ExtractedRecord, RecordFacts, TaxExpense},
};

// Re-export clients
pub use client::{FetchRequest, FilingsClient, HttpTransport, RateLimitedClient};

// Re-export stores
pub use stores::{
    Cache, CacheCategory, CacheKey, FileCacheBackend, FileCheckpointStore, MemoryCacheBackend,
    MemoryCheckpointStore,
};

// Re-export extractors
pub use extractors::{
    CompanyFactsTaxExtractor, CompensationTableExtractor, OpenAiReviewer, ReviewingExtractor,
};

// Re-export pipeline components
pub use pipeline::{
    default_extractors, AnalysisRunner, BatchProcessor, BatchProgress, BatchRunStatus,
    BatchSummary, CompanyAnalyzer, CompanyYear, ItemOutcome, OutcomeSink, ResumeAction,
    ResumeAdvisor, ResumeDecision, RunOutcome, RunReport, RunRequest, SuggestKind,
};
