//! Auto-resume decision engine.
//!
//! Looks at the stored checkpoints for a target year and decides whether a
//! new run should continue one of them, offer one to the user, or start
//! fresh.

use chrono::{DateTime, TimeDelta, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::CheckpointResult;
use crate::traits::checkpoint::CheckpointStore;
use crate::types::checkpoint::{Checkpoint, CheckpointSummary};
use crate::types::config::ResumePolicy;

/// What a suggestion proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestKind {
    /// Continue an incomplete run.
    Resume,
    /// Rerun a recently completed run with the same companies.
    Rerun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    StartNew,
    AutoResume,
    Suggest(SuggestKind),
}

impl fmt::Display for ResumeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumeAction::StartNew => f.write_str("start_new"),
            ResumeAction::AutoResume => f.write_str("auto_resume"),
            ResumeAction::Suggest(SuggestKind::Resume) => f.write_str("suggest_resume"),
            ResumeAction::Suggest(SuggestKind::Rerun) => f.write_str("suggest_rerun"),
        }
    }
}

/// The engine's verdict.
#[derive(Debug, Clone)]
pub struct ResumeDecision {
    pub action: ResumeAction,

    /// The promoted checkpoint's summary, if any.
    pub candidate: Option<CheckpointSummary>,

    /// The full checkpoint. Always present for [`ResumeAction::AutoResume`].
    pub checkpoint: Option<Checkpoint>,

    pub reason: String,
}

impl ResumeDecision {
    fn start_new(reason: impl Into<String>) -> Self {
        Self {
            action: ResumeAction::StartNew,
            candidate: None,
            checkpoint: None,
            reason: reason.into(),
        }
    }

    fn suggest(kind: SuggestKind, candidate: CheckpointSummary, reason: String) -> Self {
        Self {
            action: ResumeAction::Suggest(kind),
            candidate: Some(candidate),
            checkpoint: None,
            reason,
        }
    }
}

pub struct ResumeAdvisor {
    store: Arc<dyn CheckpointStore>,
    policy: ResumePolicy,
    clock: Arc<dyn Clock>,
}

impl ResumeAdvisor {
    pub fn new(store: Arc<dyn CheckpointStore>, policy: ResumePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &ResumePolicy {
        &self.policy
    }

    /// Decide how a run over `company_count` companies for `target_year`
    /// should start.
    pub async fn decide(
        &self,
        target_year: i32,
        company_count: usize,
        auto_resume_enabled: bool,
        force_new: bool,
    ) -> CheckpointResult<ResumeDecision> {
        if force_new {
            return Ok(ResumeDecision::start_new("fresh run forced"));
        }
        if !auto_resume_enabled {
            return Ok(ResumeDecision::start_new("auto-resume disabled"));
        }

        let now = self.clock.now();
        let (incomplete, complete): (Vec<_>, Vec<_>) = self
            .store
            .list_for_year(target_year)
            .await?
            .into_iter()
            .filter(|s| updated_within(now, s.last_updated, self.policy.max_age_hours))
            .partition(|s| s.progress_percentage() < 100.0);

        debug!(
            target_year,
            company_count,
            incomplete = incomplete.len(),
            complete = complete.len(),
            "evaluating checkpoints"
        );

        if let Some(decision) = self.promote_incomplete(incomplete, company_count).await? {
            return Ok(decision);
        }
        if let Some(decision) = self.promote_complete(complete, company_count) {
            return Ok(decision);
        }

        Ok(ResumeDecision::start_new("no suitable checkpoint found"))
    }

    async fn promote_incomplete(
        &self,
        mut candidates: Vec<CheckpointSummary>,
        company_count: usize,
    ) -> CheckpointResult<Option<ResumeDecision>> {
        candidates.sort_by(|a, b| {
            b.progress_percentage()
                .partial_cmp(&a.progress_percentage())
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    count_diff(a.total_companies, company_count)
                        .cmp(&count_diff(b.total_companies, company_count))
                })
                .then_with(|| b.last_updated.cmp(&a.last_updated))
        });
        let Some(best) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let progress = best.progress_percentage();
        let diff = count_diff(best.total_companies, company_count);

        if progress > self.policy.auto_resume_min_progress
            && within(diff, company_count, self.policy.auto_resume_count_tolerance)
        {
            // The caller resumes from the full record, never the summary.
            let Some(checkpoint) = self
                .store
                .load(&best.analysis_id, best.target_year)
                .await?
            else {
                info!(
                    analysis_id = %best.analysis_id,
                    "checkpoint disappeared before it could be resumed"
                );
                return Ok(None);
            };
            let reason = format!(
                "resuming {} at {:.1}% ({} of {} companies)",
                best.analysis_id, progress, best.completed_companies, best.total_companies
            );
            return Ok(Some(ResumeDecision {
                action: ResumeAction::AutoResume,
                candidate: Some(best),
                checkpoint: Some(checkpoint),
                reason,
            }));
        }

        if progress > self.policy.suggest_min_progress {
            let reason = format!(
                "{} is {:.1}% complete but covers {} companies (requested {})",
                best.analysis_id, progress, best.total_companies, company_count
            );
            return Ok(Some(ResumeDecision::suggest(SuggestKind::Resume, best, reason)));
        }

        Ok(None)
    }

    fn promote_complete(
        &self,
        candidates: Vec<CheckpointSummary>,
        company_count: usize,
    ) -> Option<ResumeDecision> {
        let now = self.clock.now();
        let recent = candidates
            .into_iter()
            .filter(|s| updated_within(now, s.last_updated, self.policy.rerun_window_hours))
            .max_by_key(|s| s.last_updated)?;

        let diff = count_diff(recent.total_companies, company_count);
        if !within(diff, company_count, self.policy.rerun_count_tolerance) {
            return None;
        }

        let hours = (now - recent.last_updated).num_minutes() as f64 / 60.0;
        let reason = format!(
            "{} completed {:.1}h ago with {} companies",
            recent.analysis_id, hours, recent.total_companies
        );
        Some(ResumeDecision::suggest(SuggestKind::Rerun, recent, reason))
    }
}

/// A window too large to represent as a duration never excludes anything.
fn updated_within(now: DateTime<Utc>, updated: DateTime<Utc>, hours: i64) -> bool {
    match TimeDelta::try_hours(hours) {
        Some(limit) => now - updated <= limit,
        None => true,
    }
}

fn count_diff(recorded: usize, requested: usize) -> usize {
    recorded.abs_diff(requested)
}

fn within(diff: usize, requested: usize, tolerance: f64) -> bool {
    diff as f64 <= requested as f64 * tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stores::memory::MemoryCheckpointStore;
    use crate::types::checkpoint::{AnalysisId, CompanyOutcome};
    use crate::types::cik::Cik;
    use chrono::{DateTime, Duration, Utc};

    fn checkpoint(
        id: &str,
        year: i32,
        total: u64,
        completed: u64,
        updated: DateTime<Utc>,
    ) -> Checkpoint {
        let companies: Vec<Cik> = (1..=total).map(|n| Cik::try_from(n).unwrap()).collect();
        let mut cp = Checkpoint::new(AnalysisId::new(id), year, companies.clone(), updated);
        for cik in companies.into_iter().take(completed as usize) {
            cp.record(cik, CompanyOutcome::completed(vec![], updated), updated)
                .unwrap();
        }
        cp
    }

    fn advisor(store: MemoryCheckpointStore, clock: &ManualClock) -> ResumeAdvisor {
        ResumeAdvisor::new(
            Arc::new(store),
            ResumePolicy::default(),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_recent_partial_run_auto_resumes() {
        let clock = ManualClock::starting_now();
        let cp = checkpoint("a", 2024, 100, 45, clock.now() - Duration::hours(1));
        let advisor = advisor(MemoryCheckpointStore::new().with_checkpoint(cp.clone()), &clock);

        let decision = advisor.decide(2024, 100, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::AutoResume);
        assert_eq!(decision.checkpoint.as_ref(), Some(&cp));
        assert_eq!(decision.candidate.unwrap().completed_companies, 45);
    }

    #[tokio::test]
    async fn test_stale_checkpoint_starts_new() {
        let clock = ManualClock::starting_now();
        let cp = checkpoint("a", 2024, 100, 45, clock.now() - Duration::hours(48));
        let advisor = advisor(MemoryCheckpointStore::new().with_checkpoint(cp), &clock);

        let decision = advisor.decide(2024, 100, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::StartNew);
        assert_eq!(decision.reason, "no suitable checkpoint found");
        assert!(decision.candidate.is_none());
    }

    #[tokio::test]
    async fn test_force_new_and_disabled_short_circuit() {
        let clock = ManualClock::starting_now();
        let cp = checkpoint("a", 2024, 100, 45, clock.now() - Duration::hours(1));
        let advisor = advisor(MemoryCheckpointStore::new().with_checkpoint(cp), &clock);

        let forced = advisor.decide(2024, 100, true, true).await.unwrap();
        assert_eq!(forced.action, ResumeAction::StartNew);
        let disabled = advisor.decide(2024, 100, false, false).await.unwrap();
        assert_eq!(disabled.action, ResumeAction::StartNew);
    }

    #[tokio::test]
    async fn test_other_year_is_ignored() {
        let clock = ManualClock::starting_now();
        let cp = checkpoint("a", 2023, 100, 45, clock.now() - Duration::hours(1));
        let advisor = advisor(MemoryCheckpointStore::new().with_checkpoint(cp), &clock);

        let decision = advisor.decide(2024, 100, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::StartNew);
    }

    #[tokio::test]
    async fn test_mismatched_count_above_half_is_suggested() {
        let clock = ManualClock::starting_now();
        let cp = checkpoint("a", 2024, 100, 60, clock.now() - Duration::hours(2));
        let advisor = advisor(MemoryCheckpointStore::new().with_checkpoint(cp), &clock);

        let decision = advisor.decide(2024, 50, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::Suggest(SuggestKind::Resume));
        assert!(decision.checkpoint.is_none());
    }

    #[tokio::test]
    async fn test_low_progress_mismatch_starts_new() {
        let clock = ManualClock::starting_now();
        let cp = checkpoint("a", 2024, 100, 30, clock.now() - Duration::hours(2));
        let advisor = advisor(MemoryCheckpointStore::new().with_checkpoint(cp), &clock);

        let decision = advisor.decide(2024, 50, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::StartNew);
    }

    #[tokio::test]
    async fn test_ranking_prefers_higher_progress_then_closer_count() {
        let clock = ManualClock::starting_now();
        let at = clock.now() - Duration::hours(1);
        let store = MemoryCheckpointStore::new()
            .with_checkpoint(checkpoint("low", 2024, 20, 4, at))
            .with_checkpoint(checkpoint("far", 2024, 40, 20, at))
            .with_checkpoint(checkpoint("near", 2024, 20, 10, at));
        let advisor = advisor(store, &clock);

        let decision = advisor.decide(2024, 20, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::AutoResume);
        assert_eq!(decision.candidate.unwrap().analysis_id, AnalysisId::new("near"));
    }

    #[tokio::test]
    async fn test_ranking_ties_go_to_most_recent() {
        let clock = ManualClock::starting_now();
        let store = MemoryCheckpointStore::new()
            .with_checkpoint(checkpoint("older", 2024, 20, 10, clock.now() - Duration::hours(5)))
            .with_checkpoint(checkpoint("newer", 2024, 20, 10, clock.now() - Duration::hours(1)))
            .with_checkpoint(checkpoint("oldest", 2024, 20, 10, clock.now() - Duration::hours(9)));
        let advisor = advisor(store, &clock);

        let decision = advisor.decide(2024, 20, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::AutoResume);
        assert_eq!(decision.candidate.unwrap().analysis_id, AnalysisId::new("newer"));
    }

    #[tokio::test]
    async fn test_unrepresentable_windows_exclude_nothing() {
        let clock = ManualClock::starting_now();
        let store = MemoryCheckpointStore::new()
            .with_checkpoint(checkpoint("old", 2024, 100, 45, clock.now() - Duration::days(30)));
        let policy = ResumePolicy {
            rerun_window_hours: i64::MAX,
            ..ResumePolicy::default()
        }
        .with_max_age_hours(i64::MAX / 1000);
        let advisor = ResumeAdvisor::new(Arc::new(store), policy, Arc::new(clock.clone()));

        let decision = advisor.decide(2024, 100, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::AutoResume);

        let store = MemoryCheckpointStore::new()
            .with_checkpoint(checkpoint("done", 2024, 10, 10, clock.now() - Duration::days(30)));
        let policy = ResumePolicy {
            rerun_window_hours: i64::MAX,
            ..ResumePolicy::default()
        }
        .with_max_age_hours(i64::MAX);
        let advisor = ResumeAdvisor::new(Arc::new(store), policy, Arc::new(clock));
        let decision = advisor.decide(2024, 10, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::Suggest(SuggestKind::Rerun));
    }

    #[tokio::test]
    async fn test_recent_complete_run_is_suggested_for_rerun() {
        let clock = ManualClock::starting_now();
        let store = MemoryCheckpointStore::new()
            .with_checkpoint(checkpoint("done", 2024, 10, 10, clock.now() - Duration::hours(2)));
        let advisor = advisor(store, &clock);

        let decision = advisor.decide(2024, 10, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::Suggest(SuggestKind::Rerun));

        // Outside the rerun window nothing is promoted.
        clock.advance(Duration::hours(5));
        let decision = advisor.decide(2024, 10, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::StartNew);
    }

    #[tokio::test]
    async fn test_complete_run_with_different_count_is_not_suggested() {
        let clock = ManualClock::starting_now();
        let store = MemoryCheckpointStore::new()
            .with_checkpoint(checkpoint("done", 2024, 10, 10, clock.now() - Duration::hours(1)));
        let advisor = advisor(store, &clock);

        let decision = advisor.decide(2024, 20, true, false).await.unwrap();
        assert_eq!(decision.action, ResumeAction::StartNew);
    }
}
