//! Analysis runner - one checkpointed run over a company list.
//!
//! A run:
//! 1. decides whether to resume a stored checkpoint or start a new one
//! 2. computes the remaining companies (requested minus already recorded)
//! 3. drives them through the batch processor
//! 4. records and saves every outcome as it settles
//!
//! Losing the checkpoint store is the only fatal condition: a run that can
//! no longer persist progress stops rather than doing unrecorded work.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::{PipelineError, Result};
use crate::pipeline::batch::{BatchProcessor, BatchProgress, BatchRunStatus, ItemOutcome, OutcomeSink};
use crate::pipeline::resume::{ResumeAction, ResumeAdvisor, ResumeDecision};
use crate::traits::{checkpoint::CheckpointStore, worker::CompanyWorker};
use crate::types::{
    checkpoint::{AnalysisId, Checkpoint, CheckpointSummary, CompanyOutcome, RunStats},
    cik::Cik,
    config::PipelineConfig,
    record::ExtractedRecord,
};

/// Default number of processed companies between progress log lines.
const DEFAULT_STATS_INTERVAL: usize = 10;

/// A request to analyze companies for one fiscal year.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub target_year: i32,
    pub companies: Vec<Cik>,

    /// Let the decision engine resume a matching checkpoint.
    pub auto_resume: bool,

    /// Always start a new checkpoint.
    pub force_new: bool,

    /// Resume this checkpoint, bypassing the decision engine.
    pub resume_from: Option<AnalysisId>,

    /// Re-attempt companies recorded as failed.
    pub retry_failed: bool,
}

impl RunRequest {
    pub fn new(target_year: i32, companies: Vec<Cik>) -> Self {
        Self {
            target_year,
            companies,
            auto_resume: true,
            force_new: false,
            resume_from: None,
            retry_failed: false,
        }
    }

    pub fn with_auto_resume(mut self, enabled: bool) -> Self {
        self.auto_resume = enabled;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn resume_from(mut self, analysis_id: AnalysisId) -> Self {
        self.resume_from = Some(analysis_id);
        self
    }

    pub fn retry_failed(mut self) -> Self {
        self.retry_failed = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every remaining company was processed.
    Completed,
    /// Cancelled before the end; the checkpoint holds everything recorded.
    Interrupted,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub analysis_id: AnalysisId,
    pub action: ResumeAction,
    pub reason: String,

    /// Summary of a checkpoint the caller may want to resume or rerun
    /// instead, when the decision was a suggestion.
    pub suggestion: Option<CheckpointSummary>,

    pub outcome: RunOutcome,

    /// Companies processed by this invocation.
    pub run_stats: RunStats,

    /// The checkpoint as last saved.
    pub checkpoint: Checkpoint,
}

/// A (company, fiscal year) work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompanyYear {
    pub cik: Cik,
    pub fiscal_year: i32,
}

impl fmt::Display for CompanyYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cik, self.fiscal_year)
    }
}

pub struct AnalysisRunner {
    worker: Arc<dyn CompanyWorker>,
    store: Arc<dyn CheckpointStore>,
    advisor: ResumeAdvisor,
    processor: BatchProcessor,
    clock: Arc<dyn Clock>,
    stats_interval: usize,
}

impl AnalysisRunner {
    pub fn new(
        worker: Arc<dyn CompanyWorker>,
        store: Arc<dyn CheckpointStore>,
        config: &PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            worker,
            advisor: ResumeAdvisor::new(store.clone(), config.resume.clone(), clock.clone()),
            store,
            processor: BatchProcessor::new(config.batch.clone()),
            clock,
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }

    /// Log summary statistics every `interval` processed companies.
    pub fn with_stats_interval(mut self, interval: usize) -> Self {
        self.stats_interval = interval.max(1);
        self
    }

    pub fn advisor(&self) -> &ResumeAdvisor {
        &self.advisor
    }

    /// Run an analysis, saving progress after every company.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<RunReport> {
        let requested = dedupe(request.companies.clone());
        if requested.is_empty() && request.resume_from.is_none() {
            return Err(PipelineError::InvalidRequest {
                reason: "no companies requested".into(),
            });
        }

        let (mut checkpoint, decision) = self.open_checkpoint(&request, &requested).await?;
        let requested = if requested.is_empty() {
            checkpoint.companies().to_vec()
        } else {
            requested
        };

        let remaining = checkpoint.remaining(&requested, request.retry_failed);
        info!(
            analysis_id = %checkpoint.analysis_id(),
            target_year = request.target_year,
            action = %decision.action,
            reason = %decision.reason,
            total = checkpoint.total_companies(),
            already_done = checkpoint.completed_companies(),
            remaining = remaining.len(),
            "starting analysis run"
        );

        // Persist up front so the run is listed even before its first result.
        self.store.save(&checkpoint).await?;

        let year = request.target_year;
        let mut sink = CheckpointSink {
            checkpoint: &mut checkpoint,
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            stats: RunStats::default(),
            stats_interval: self.stats_interval,
            total: remaining.len(),
        };

        let summary = self
            .processor
            .run(
                remaining,
                |cik: Cik| {
                    let worker = self.worker.clone();
                    async move { worker.analyze(&cik, year).await.map(Some) }
                },
                &mut sink,
                &cancel,
            )
            .await;

        let run_stats = sink.stats;
        let summary = match summary {
            Ok(summary) => summary,
            Err(e) => {
                error!(
                    analysis_id = %checkpoint.analysis_id(),
                    error = %e,
                    "run aborted: progress can no longer be saved"
                );
                return Err(e);
            }
        };

        let outcome = match summary.status {
            BatchRunStatus::Completed => RunOutcome::Completed,
            BatchRunStatus::Cancelled => RunOutcome::Interrupted,
        };
        info!(
            analysis_id = %checkpoint.analysis_id(),
            outcome = ?outcome,
            progress_pct = checkpoint.progress_percentage(),
            "run finished: {}",
            run_stats
        );

        Ok(RunReport {
            analysis_id: checkpoint.analysis_id().clone(),
            action: decision.action,
            reason: decision.reason,
            suggestion: match decision.action {
                ResumeAction::Suggest(_) => decision.candidate,
                _ => None,
            },
            outcome,
            run_stats,
            checkpoint,
        })
    }

    /// Analyze one company across several fiscal years, without a checkpoint.
    ///
    /// Years that fail or yield nothing are skipped.
    pub async fn run_years(&self, cik: &Cik, years: &[i32]) -> Vec<ExtractedRecord> {
        let items: Vec<CompanyYear> = years
            .iter()
            .map(|&fiscal_year| CompanyYear {
                cik: cik.clone(),
                fiscal_year,
            })
            .collect();

        self.processor
            .process(
                items,
                |item: CompanyYear| {
                    let worker = self.worker.clone();
                    async move {
                        let records = worker.analyze(&item.cik, item.fiscal_year).await?;
                        Ok::<_, crate::error::AnalyzeError>((!records.is_empty()).then_some(records))
                    }
                },
                None,
            )
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Load the checkpoint to continue, or create a new one.
    async fn open_checkpoint(
        &self,
        request: &RunRequest,
        requested: &[Cik],
    ) -> Result<(Checkpoint, ResumeDecision)> {
        let year = request.target_year;

        if let Some(id) = &request.resume_from {
            let mut checkpoint = self.store.load(id, year).await?.ok_or_else(|| {
                PipelineError::ResumeTargetMissing {
                    analysis_id: id.to_string(),
                    target_year: year,
                }
            })?;
            checkpoint.extend_companies(requested.iter().cloned());
            let decision = ResumeDecision {
                action: ResumeAction::AutoResume,
                candidate: Some(checkpoint.summary()),
                checkpoint: None,
                reason: format!("resuming {} on request", id),
            };
            return Ok((checkpoint, decision));
        }

        let mut decision = self
            .advisor
            .decide(year, requested.len(), request.auto_resume, request.force_new)
            .await?;

        if let (ResumeAction::AutoResume, Some(mut checkpoint)) =
            (decision.action, decision.checkpoint.take())
        {
            checkpoint.extend_companies(requested.iter().cloned());
            return Ok((checkpoint, decision));
        }

        let checkpoint = Checkpoint::new(
            AnalysisId::generate(year),
            year,
            requested.iter().cloned(),
            self.clock.now(),
        );
        Ok((checkpoint, decision))
    }
}

fn dedupe(companies: Vec<Cik>) -> Vec<Cik> {
    let mut seen = HashSet::new();
    companies
        .into_iter()
        .filter(|cik| seen.insert(cik.clone()))
        .collect()
}

/// Folds outcomes into the checkpoint and saves after each one.
struct CheckpointSink<'a> {
    checkpoint: &'a mut Checkpoint,
    store: &'a dyn CheckpointStore,
    clock: &'a dyn Clock,
    stats: RunStats,
    stats_interval: usize,
    total: usize,
}

#[async_trait]
impl<'a> OutcomeSink<Cik, Vec<ExtractedRecord>> for CheckpointSink<'a> {
    async fn on_item(&mut self, outcome: ItemOutcome<Cik, Vec<ExtractedRecord>>) -> Result<()> {
        let now = self.clock.now();
        let (cik, company_outcome) = match outcome {
            ItemOutcome::Succeeded { item, result } => {
                self.stats.succeeded += 1;
                self.stats.records += result.len();
                (item, CompanyOutcome::completed(result, now))
            }
            ItemOutcome::Empty { item } => {
                self.stats.succeeded += 1;
                (item, CompanyOutcome::completed(Vec::new(), now))
            }
            ItemOutcome::Failed { item, error } => {
                self.stats.failed += 1;
                (item, CompanyOutcome::failed(error, now))
            }
        };

        self.checkpoint.record(cik, company_outcome, now)?;
        self.store.save(&*self.checkpoint).await?;

        let processed = self.stats.processed();
        if processed % self.stats_interval == 0 && processed < self.total {
            info!(
                analysis_id = %self.checkpoint.analysis_id(),
                processed,
                total = self.total,
                "progress: {}",
                self.stats
            );
        }
        Ok(())
    }

    async fn on_batch(&mut self, progress: BatchProgress) -> Result<()> {
        info!(
            analysis_id = %self.checkpoint.analysis_id(),
            batch = progress.batch,
            batch_count = progress.batch_count,
            progress_pct = self.checkpoint.progress_percentage(),
            "batch saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stores::memory::MemoryCheckpointStore;
    use crate::testing::{FailingCheckpointStore, MockWorker};
    use crate::types::config::BatchConfig;

    fn ciks(n: u64) -> Vec<Cik> {
        (1..=n).map(|i| Cik::try_from(i).unwrap()).collect()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            batch: BatchConfig::default()
                .with_item_delay_ms(0)
                .with_batch_delay_ms(0)
                .with_batch_size(3),
            ..Default::default()
        }
    }

    fn runner(
        worker: Arc<MockWorker>,
        store: Arc<dyn CheckpointStore>,
        clock: &ManualClock,
    ) -> AnalysisRunner {
        AnalysisRunner::new(worker, store, &config(), Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_run_records_every_company_and_saves_monotonically() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryCheckpointStore::new());
        let worker = Arc::new(MockWorker::new().failing_for(Cik::try_from(3u64).unwrap()));
        let runner = runner(worker, store.clone(), &clock);

        let report = runner
            .run(RunRequest::new(2024, ciks(7)), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.action, ResumeAction::StartNew);
        assert_eq!(report.run_stats.succeeded, 6);
        assert_eq!(report.run_stats.failed, 1);
        assert!(report.checkpoint.is_complete());
        assert_eq!(report.checkpoint.failed_companies(), vec![Cik::try_from(3u64).unwrap()]);

        // Initial save plus one per company.
        let history = store.save_history();
        assert_eq!(history.len(), 8);
        for pair in history.windows(2) {
            assert!(pair[1].completed_companies >= pair[0].completed_companies);
        }
        assert!(history.iter().all(|s| s.completed_companies <= s.total_companies));
    }

    #[tokio::test]
    async fn test_duplicate_companies_are_processed_once() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryCheckpointStore::new());
        let worker = Arc::new(MockWorker::new());
        let runner = runner(worker.clone(), store, &clock);

        let mut companies = ciks(3);
        companies.push(Cik::parse("0000000001").unwrap());
        let report = runner
            .run(RunRequest::new(2024, companies), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.checkpoint.total_companies(), 3);
        assert_eq!(worker.call_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let clock = ManualClock::starting_now();
        let runner = runner(
            Arc::new(MockWorker::new()),
            Arc::new(MemoryCheckpointStore::new()),
            &clock,
        );
        let err = runner
            .run(RunRequest::new(2024, vec![]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_unwritable_store_is_fatal() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(FailingCheckpointStore::after(3));
        let worker = Arc::new(MockWorker::new());
        let runner = runner(worker.clone(), store, &clock);

        let err = runner
            .run(RunRequest::new(2024, ciks(9)), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Checkpoint(crate::error::CheckpointError::Unwritable { .. })
        ));
        // The initial save and two items succeeded, the third item's save failed.
        assert!(worker.call_count() < 9);
    }

    #[tokio::test]
    async fn test_retry_failed_reattempts_failures_only() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryCheckpointStore::new());
        let flaky = Cik::try_from(2u64).unwrap();

        let first = runner(
            Arc::new(MockWorker::new().failing_for(flaky.clone())),
            store.clone(),
            &clock,
        )
        .run(RunRequest::new(2024, ciks(4)), CancellationToken::new())
        .await
        .unwrap();
        assert_eq!(first.checkpoint.stats().failed, 1);

        let worker = Arc::new(MockWorker::new());
        let second = runner(worker.clone(), store.clone(), &clock)
            .run(
                RunRequest::new(2024, ciks(4))
                    .resume_from(first.analysis_id.clone())
                    .retry_failed(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(worker.calls(), vec![flaky]);
        assert_eq!(second.analysis_id, first.analysis_id);
        assert_eq!(second.checkpoint.stats().failed, 0);
        assert_eq!(second.checkpoint.completed_companies(), 4);
    }

    #[tokio::test]
    async fn test_resume_from_unknown_checkpoint_fails() {
        let clock = ManualClock::starting_now();
        let runner = runner(
            Arc::new(MockWorker::new()),
            Arc::new(MemoryCheckpointStore::new()),
            &clock,
        );
        let err = runner
            .run(
                RunRequest::new(2024, ciks(2)).resume_from(AnalysisId::new("missing")),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ResumeTargetMissing { .. }));
    }

    #[tokio::test]
    async fn test_run_years_collects_records_per_year() {
        let clock = ManualClock::starting_now();
        let worker = Arc::new(MockWorker::new().with_records_per_company(2));
        let runner = runner(worker.clone(), Arc::new(MemoryCheckpointStore::new()), &clock);

        let cik = Cik::parse("320193").unwrap();
        let records = runner.run_years(&cik, &[2021, 2022, 2023]).await;
        assert_eq!(records.len(), 6);
        let mut years: Vec<i32> = records.iter().map(|r| r.fiscal_year).collect();
        years.sort();
        years.dedup();
        assert_eq!(years, vec![2021, 2022, 2023]);
    }
}
