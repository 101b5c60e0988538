//! Parallel batch processor.
//!
//! Drives work items through a worker in batches:
//! - all items of a batch are in flight together, capped by a semaphore
//! - each item waits a small pacing delay before its worker runs
//! - a failing (or panicking) worker only fails its own item
//! - batches are separated by a fixed pause, and batch N starts only after
//!   every outcome of batch N-1 has been handed to the sink
//!
//! Everything runs on the caller's task: concurrency comes from polling the
//! in-flight futures together, not from spawning.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::config::BatchConfig;

/// Longest error message carried on a failed outcome.
const MAX_ERROR_LEN: usize = 300;

/// How one item settled.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome<I, R> {
    Succeeded { item: I, result: R },
    /// The worker ran but had nothing to report.
    Empty { item: I },
    Failed { item: I, error: String },
}

impl<I, R> ItemOutcome<I, R> {
    pub fn item(&self) -> &I {
        match self {
            ItemOutcome::Succeeded { item, .. }
            | ItemOutcome::Empty { item }
            | ItemOutcome::Failed { item, .. } => item,
        }
    }
}

/// Progress after a settled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based index of the batch that just settled
    pub batch: usize,
    pub batch_count: usize,
    pub completed: usize,
    pub total: usize,
}

/// Receives outcomes as they settle.
///
/// An `Err` from the sink stops the run; use it only for conditions that
/// make continuing pointless (e.g. progress can no longer be persisted).
#[async_trait]
pub trait OutcomeSink<I: Send, R: Send>: Send {
    async fn on_item(&mut self, outcome: ItemOutcome<I, R>) -> Result<()>;

    async fn on_batch(&mut self, _progress: BatchProgress) -> Result<()> {
        Ok(())
    }
}

/// Whether the run saw every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRunStatus {
    Completed,
    Cancelled,
}

/// Counters for one processor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub status: BatchRunStatus,
}

impl BatchSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            empty: 0,
            failed: 0,
            status: BatchRunStatus::Completed,
        }
    }

    pub fn settled(&self) -> usize {
        self.succeeded + self.empty + self.failed
    }
}

pub struct BatchProcessor {
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Process `items` and collect the successful results.
    ///
    /// Failed and empty items are dropped. `progress` is called with
    /// `(completed, total)` after each batch.
    pub async fn process<I, R, E, F, Fut>(
        &self,
        items: Vec<I>,
        worker: F,
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Vec<R>
    where
        I: Clone + Display + Send + Sync + 'static,
        R: Send,
        E: Display,
        F: Fn(I) -> Fut + Sync,
        Fut: Future<Output = std::result::Result<Option<R>, E>> + Send,
    {
        let mut sink = CollectSink {
            results: Vec::new(),
            progress,
        };
        if let Err(e) = self
            .run(items, worker, &mut sink, &CancellationToken::new())
            .await
        {
            warn!(error = %e, "batch run aborted");
        }
        sink.results
    }

    /// Process `items`, handing every outcome to `sink` as it settles.
    pub async fn run<I, R, E, F, Fut, S>(
        &self,
        items: Vec<I>,
        worker: F,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary>
    where
        I: Clone + Display + Send + Sync,
        R: Send,
        E: Display,
        F: Fn(I) -> Fut + Sync,
        Fut: Future<Output = std::result::Result<Option<R>, E>> + Send,
        S: OutcomeSink<I, R>,
    {
        let total = items.len();
        let mut summary = BatchSummary::new(total);
        if total == 0 {
            return Ok(summary);
        }

        let batch_size = self.config.batch_size_for(total);
        let batch_count = total.div_ceil(batch_size);
        let semaphore = Semaphore::new(self.config.max_concurrency.max(1));

        info!(
            total,
            batch_size,
            batch_count,
            max_concurrency = self.config.max_concurrency,
            "starting batch processing"
        );

        'batches: for (index, batch) in items.chunks(batch_size).enumerate() {
            if index > 0 && !self.pause_between_batches(cancel).await {
                summary.status = BatchRunStatus::Cancelled;
                break;
            }
            if cancel.is_cancelled() {
                summary.status = BatchRunStatus::Cancelled;
                break;
            }

            debug!(batch = index + 1, batch_count, size = batch.len(), "dispatching batch");

            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .cloned()
                .map(|item| self.dispatch(item, &worker, &semaphore))
                .collect();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!(
                            abandoned = in_flight.len(),
                            "cancellation requested, abandoning in-flight items"
                        );
                        summary.status = BatchRunStatus::Cancelled;
                        break 'batches;
                    }
                    next = in_flight.next() => next,
                };
                let Some(outcome) = next else { break };

                match &outcome {
                    ItemOutcome::Succeeded { .. } => summary.succeeded += 1,
                    ItemOutcome::Empty { .. } => summary.empty += 1,
                    ItemOutcome::Failed { .. } => summary.failed += 1,
                }
                sink.on_item(outcome).await?;
            }

            let progress = BatchProgress {
                batch: index + 1,
                batch_count,
                completed: summary.settled(),
                total,
            };
            info!(
                batch = progress.batch,
                batch_count,
                completed = progress.completed,
                total,
                failed = summary.failed,
                "batch settled"
            );
            sink.on_batch(progress).await?;
        }

        Ok(summary)
    }

    /// Sleep the inter-batch delay. Returns `false` if cancelled meanwhile.
    async fn pause_between_batches(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.batch_delay()) => true,
        }
    }

    async fn dispatch<I, R, E, F, Fut>(
        &self,
        item: I,
        worker: &F,
        semaphore: &Semaphore,
    ) -> ItemOutcome<I, R>
    where
        I: Clone + Display,
        E: Display,
        F: Fn(I) -> Fut,
        Fut: Future<Output = std::result::Result<Option<R>, E>>,
    {
        let Ok(_permit) = semaphore.acquire().await else {
            return ItemOutcome::Failed {
                item,
                error: "concurrency limiter closed".to_string(),
            };
        };

        tokio::time::sleep(self.config.item_delay()).await;

        // Calling the worker inside the guarded future also catches panics
        // raised before its first await point.
        let guarded = AssertUnwindSafe(async { worker(item.clone()).await }).catch_unwind();
        let result = match self.config.item_timeout() {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    let error = format!("timed out after {}s", limit.as_secs());
                    warn!(item = %item, error = %error, "work item failed");
                    return ItemOutcome::Failed { item, error };
                }
            },
            None => guarded.await,
        };

        match result {
            Ok(Ok(Some(result))) => ItemOutcome::Succeeded { item, result },
            Ok(Ok(None)) => {
                debug!(item = %item, "work item produced no data");
                ItemOutcome::Empty { item }
            }
            Ok(Err(e)) => {
                let error = truncate_message(&e.to_string());
                warn!(item = %item, error = %error, "work item failed");
                ItemOutcome::Failed { item, error }
            }
            Err(panic) => {
                let error = format!("worker panicked: {}", truncate_message(&panic_message(&panic)));
                warn!(item = %item, error = %error, "work item failed");
                ItemOutcome::Failed { item, error }
            }
        }
    }
}

struct CollectSink<'a, R> {
    results: Vec<R>,
    progress: Option<&'a (dyn Fn(usize, usize) + Send + Sync)>,
}

#[async_trait]
impl<'a, I: Send + 'static, R: Send> OutcomeSink<I, R> for CollectSink<'a, R> {
    async fn on_item(&mut self, outcome: ItemOutcome<I, R>) -> Result<()> {
        if let ItemOutcome::Succeeded { result, .. } = outcome {
            self.results.push(result);
        }
        Ok(())
    }

    async fn on_batch(&mut self, progress: BatchProgress) -> Result<()> {
        if let Some(callback) = self.progress {
            callback(progress.completed, progress.total);
        }
        Ok(())
    }
}

/// Cut an error message down to a loggable length on a char boundary.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn fast_config() -> BatchConfig {
        BatchConfig::default()
            .with_item_delay_ms(0)
            .with_batch_delay_ms(0)
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_item() {
        let processor = BatchProcessor::new(fast_config());

        let results = processor
            .process(
                vec![1u32, 2, 3, 4, 5],
                |n| async move {
                    if n == 3 {
                        Err(format!("item {} exploded", n))
                    } else {
                        Ok(Some(n * 10))
                    }
                },
                None,
            )
            .await;

        let mut sorted = results.clone();
        sorted.sort();
        assert_eq!(sorted, vec![10, 20, 40, 50]);
    }

    #[tokio::test]
    async fn test_empty_results_are_dropped() {
        let processor = BatchProcessor::new(fast_config());
        let results = processor
            .process(
                vec![1u32, 2, 3, 4],
                |n| async move { Ok::<_, String>(if n % 2 == 0 { Some(n) } else { None }) },
                None,
            )
            .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_worker_is_contained() {
        let processor = BatchProcessor::new(fast_config());
        let results = processor
            .process(
                vec![1u32, 2, 3],
                |n| async move {
                    if n == 2 {
                        panic!("bug in extraction");
                    }
                    Ok::<_, String>(Some(n))
                },
                None,
            )
            .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_worker_panicking_before_first_await_is_contained() {
        let processor = BatchProcessor::new(fast_config());
        let mut results = processor
            .process(
                vec![1u32, 2, 3],
                |n| {
                    if n == 2 {
                        panic!("bug while building the request");
                    }
                    async move { Ok::<_, String>(Some(n)) }
                },
                None,
            )
            .await;
        results.sort_unstable();
        assert_eq!(results, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_holds_within_large_batch() {
        let processor = BatchProcessor::new(
            fast_config()
                .with_batch_size(12)
                .with_max_concurrency(3),
        );
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = processor
            .process(
                (0..12u32).collect(),
                |n| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(Some(n))
                    }
                },
                None,
            )
            .await;

        assert_eq!(results.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_progress_callback_after_each_batch() {
        let processor = BatchProcessor::new(fast_config().with_batch_size(2));
        let seen = Mutex::new(Vec::new());
        let callback = |done: usize, total: usize| seen.lock().unwrap().push((done, total));

        processor
            .process(
                vec![1u32, 2, 3, 4, 5],
                |n| async move { Ok::<_, String>(Some(n)) },
                Some(&callback),
            )
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![(2, 5), (4, 5), (5, 5)]);
    }

    #[tokio::test]
    async fn test_batches_are_paced_and_ordered() {
        let processor = BatchProcessor::new(
            fast_config()
                .with_batch_size(2)
                .with_batch_delay_ms(40),
        );

        let start = Instant::now();
        let results = processor
            .process(
                vec![1u32, 2, 3, 4, 5, 6],
                |n| async move {
                    // Later items in a batch finish first.
                    tokio::time::sleep(Duration::from_millis(if n % 2 == 1 { 15 } else { 1 })).await;
                    Ok::<_, String>(Some(n))
                },
                None,
            )
            .await;

        assert!(start.elapsed() >= Duration::from_millis(80));
        // Batch order is preserved even though in-batch order is not.
        let batches: Vec<Vec<u32>> = results
            .chunks(2)
            .map(|c| {
                let mut c = c.to_vec();
                c.sort();
                c
            })
            .collect();
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[tokio::test]
    async fn test_item_timeout_fails_slow_item() {
        let mut config = fast_config();
        config.item_timeout_secs = Some(1);
        let processor = BatchProcessor::new(config);

        struct Recorder(Vec<ItemOutcome<u32, u32>>);

        #[async_trait]
        impl OutcomeSink<u32, u32> for Recorder {
            async fn on_item(&mut self, outcome: ItemOutcome<u32, u32>) -> Result<()> {
                self.0.push(outcome);
                Ok(())
            }
        }

        let mut sink = Recorder(Vec::new());
        let summary = processor
            .run(
                vec![1u32, 2],
                |n| async move {
                    if n == 2 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, String>(Some(n))
                },
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(sink.0.iter().any(|o| matches!(
            o,
            ItemOutcome::Failed { item: 2, error } if error.contains("timed out")
        )));
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_batches() {
        let processor = BatchProcessor::new(fast_config().with_batch_size(1));
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        struct Null;

        #[async_trait]
        impl OutcomeSink<u32, u32> for Null {
            async fn on_item(&mut self, _outcome: ItemOutcome<u32, u32>) -> Result<()> {
                Ok(())
            }
        }

        let summary = processor
            .run(
                vec![1u32, 2, 3, 4],
                |n| {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    if call == 1 {
                        cancel.cancel();
                    }
                    async move {
                        if call == 1 {
                            tokio::time::sleep(Duration::from_millis(200)).await;
                        }
                        Ok::<_, String>(Some(n))
                    }
                },
                &mut Null,
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(summary.status, BatchRunStatus::Cancelled);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_truncate_message() {
        let long = "x".repeat(1000);
        let cut = truncate_message(&long);
        assert_eq!(cut.len(), MAX_ERROR_LEN + 3);
        assert_eq!(truncate_message("short"), "short");
    }
}
