//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the pipeline without network access,
//! real filings, or an LLM.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{
    AnalyzeError, CheckpointError, CheckpointResult, ExtractionError, ExtractionResult, FetchError,
    FetchResult,
};
use crate::stores::memory::MemoryCheckpointStore;
use crate::traits::{
    checkpoint::CheckpointStore,
    extractor::{Document, DocumentKind, Extraction, Extractor},
    reviewer::RecordReviewer,
    transport::Transport,
    worker::CompanyWorker,
};
use crate::types::{
    checkpoint::{AnalysisId, Checkpoint, CheckpointSummary},
    cik::Cik,
    record::{Amount, ExtractedRecord, RecordFacts, TaxExpense},
};

pub use crate::clock::ManualClock;

/// A scripted transport.
///
/// Each URL answers from its script in order; the last scripted answer
/// repeats forever. Unscripted URLs answer HTTP 404.
#[derive(Default)]
pub struct MockTransport {
    scripts: RwLock<HashMap<String, VecDeque<FetchResult<String>>>>,
    calls: RwLock<Vec<String>>,
    latency: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `body`.
    pub fn with_response(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_sequence(url, vec![Ok(body.into())])
    }

    /// Fail every request for `url` with `error`.
    pub fn with_failure(self, url: impl Into<String>, error: FetchError) -> Self {
        self.with_sequence(url, vec![Err(error)])
    }

    /// Answer `url` with each result in turn.
    pub fn with_sequence(self, url: impl Into<String>, results: Vec<FetchResult<String>>) -> Self {
        self.scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), results.into());
        self
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    fn next_answer(&self, url: &str) -> FetchResult<String> {
        let mut scripts = self.scripts.write().unwrap_or_else(PoisonError::into_inner);
        let Some(script) = scripts.get_mut(url) else {
            return Err(FetchError::from_status(url, 404));
        };
        if script.len() > 1 {
            script
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::from_status(url, 404)))
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::from_status(url, 404)))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> FetchResult<String> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next_answer(url)
    }
}

/// A configurable company worker.
///
/// By default every company yields one tax expense record.
pub struct MockWorker {
    records_per_company: usize,
    failing: HashSet<Cik>,
    empty: HashSet<Cik>,
    panicking: HashSet<Cik>,
    delay: Option<Duration>,
    cancel_after: Option<(usize, CancellationToken)>,
    calls: RwLock<Vec<Cik>>,
}

impl Default for MockWorker {
    fn default() -> Self {
        Self {
            records_per_company: 1,
            failing: HashSet::new(),
            empty: HashSet::new(),
            panicking: HashSet::new(),
            delay: None,
            cancel_after: None,
            calls: RwLock::new(Vec::new()),
        }
    }
}

impl MockWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records_per_company(mut self, n: usize) -> Self {
        self.records_per_company = n;
        self
    }

    /// Fail analysis of `cik` with a permanent fetch error.
    pub fn failing_for(mut self, cik: Cik) -> Self {
        self.failing.insert(cik);
        self
    }

    /// Return no records for `cik`.
    pub fn empty_for(mut self, cik: Cik) -> Self {
        self.empty.insert(cik);
        self
    }

    /// Panic while analyzing `cik`.
    pub fn panicking_for(mut self, cik: Cik) -> Self {
        self.panicking.insert(cik);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancel `token` when the `n`th call starts.
    pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Companies analyzed so far, in call order.
    pub fn calls(&self) -> Vec<Cik> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The records the worker produces for `cik` and `fiscal_year`.
    pub fn records_for(&self, cik: &Cik, fiscal_year: i32) -> Vec<ExtractedRecord> {
        (0..self.records_per_company)
            .map(|i| {
                let tax = TaxExpense {
                    total: Amount::non_negative(Decimal::from(1_000 * (i as u64 + 1))),
                    ..Default::default()
                };
                ExtractedRecord::new(
                    cik.clone(),
                    fiscal_year,
                    RecordFacts::TaxExpense(tax),
                    format!("mock:{}:{}", cik, i),
                )
            })
            .collect()
    }
}

#[async_trait]
impl CompanyWorker for MockWorker {
    async fn analyze(&self, cik: &Cik, fiscal_year: i32) -> Result<Vec<ExtractedRecord>, AnalyzeError> {
        let call = {
            let mut calls = self.calls.write().unwrap_or_else(PoisonError::into_inner);
            calls.push(cik.clone());
            calls.len()
        };
        if let Some((n, token)) = &self.cancel_after {
            if call >= *n {
                token.cancel();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.panicking.contains(cik) {
            panic!("mock worker panicked on {}", cik);
        }
        if self.failing.contains(cik) {
            return Err(FetchError::from_status(format!("mock://{}", cik), 404).into());
        }
        if self.empty.contains(cik) {
            return Ok(Vec::new());
        }
        Ok(self.records_for(cik, fiscal_year))
    }
}

/// An extractor with a fixed answer.
pub struct MockExtractor {
    answer: MockAnswer,
    calls: AtomicUsize,
}

enum MockAnswer {
    Extraction(Extraction),
    NoData,
    Unparseable,
}

impl MockExtractor {
    /// Return `extraction` for every document.
    pub fn new(extraction: Extraction) -> Self {
        Self {
            answer: MockAnswer::Extraction(extraction),
            calls: AtomicUsize::new(0),
        }
    }

    /// Report no data for the requested year.
    pub fn no_data() -> Self {
        Self {
            answer: MockAnswer::NoData,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail with a parse error.
    pub fn unparseable() -> Self {
        Self {
            answer: MockAnswer::Unparseable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn accepts(&self, _kind: DocumentKind) -> bool {
        true
    }

    async fn extract(
        &self,
        _document: &Document,
        _cik: &Cik,
        target_year: i32,
    ) -> ExtractionResult<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            MockAnswer::Extraction(extraction) => Ok(extraction.clone()),
            MockAnswer::NoData => Err(ExtractionError::NoData { year: target_year }),
            MockAnswer::Unparseable => Err(ExtractionError::Parse("mock parse failure".into())),
        }
    }
}

/// A reviewer with a fixed answer.
pub struct MockReviewer {
    records: Option<Vec<ExtractedRecord>>,
    calls: AtomicUsize,
}

impl MockReviewer {
    /// Answer every review with `records`.
    pub fn new(records: Vec<ExtractedRecord>) -> Self {
        Self {
            records: Some(records),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every review.
    pub fn failing() -> Self {
        Self {
            records: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordReviewer for MockReviewer {
    async fn review(
        &self,
        _document: &Document,
        _cik: &Cik,
        _excerpt: &str,
        _draft: &[ExtractedRecord],
        _target_year: i32,
    ) -> ExtractionResult<Vec<ExtractedRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .clone()
            .ok_or_else(|| ExtractionError::Review("mock reviewer unavailable".into()))
    }
}

/// A checkpoint store whose disk "fills up" after a number of saves.
pub struct FailingCheckpointStore {
    inner: MemoryCheckpointStore,
    allowed_saves: usize,
    saves: AtomicUsize,
}

impl FailingCheckpointStore {
    /// Accept `allowed_saves` saves, then fail every later one.
    pub fn after(allowed_saves: usize) -> Self {
        Self {
            inner: MemoryCheckpointStore::new(),
            allowed_saves,
            saves: AtomicUsize::new(0),
        }
    }

    /// The last successfully saved state.
    pub fn last_saved(&self, analysis_id: &AnalysisId) -> Option<Checkpoint> {
        self.inner.get(analysis_id)
    }
}

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) >= self.allowed_saves {
            return Err(CheckpointError::Unwritable {
                path: "memory://failing".into(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "no space left for checkpoints"),
            });
        }
        self.inner.save(checkpoint).await
    }

    async fn load(
        &self,
        analysis_id: &AnalysisId,
        target_year: i32,
    ) -> CheckpointResult<Option<Checkpoint>> {
        self.inner.load(analysis_id, target_year).await
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointSummary>> {
        self.inner.list().await
    }
}
