//! Checkpoint types - durable progress of one analysis run.
//!
//! A [`Checkpoint`] owns the run's company list and the outcome recorded for
//! each finished company. Counts and progress are derived from those two
//! collections, so they cannot drift from the data they describe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::error::{CheckpointError, CheckpointResult};
use crate::types::{cik::Cik, record::ExtractedRecord};

/// Stable identifier of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(String);

impl AnalysisId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, time-ordered id for a run targeting `target_year`.
    pub fn generate(target_year: i32) -> Self {
        Self(format!("analysis-{}-{}", target_year, Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened to one company in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompanyOutcome {
    /// Processed. `records` may be empty when the filings held no data.
    Completed {
        records: Vec<ExtractedRecord>,
        at: DateTime<Utc>,
    },

    /// Terminal failure for this run.
    Failed { error: String, at: DateTime<Utc> },
}

impl CompanyOutcome {
    pub fn completed(records: Vec<ExtractedRecord>, at: DateTime<Utc>) -> Self {
        CompanyOutcome::Completed { records, at }
    }

    pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        CompanyOutcome::Failed {
            error: error.into(),
            at,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CompanyOutcome::Failed { .. })
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        match self {
            CompanyOutcome::Completed { records, .. } => records,
            CompanyOutcome::Failed { .. } => &[],
        }
    }
}

/// Succeeded / failed counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
}

impl RunStats {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Percentage of processed companies that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.processed() == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.processed() as f64 * 100.0
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed ({:.1}% success), {} records",
            self.succeeded,
            self.failed,
            self.success_rate(),
            self.records
        )
    }
}

/// Progress snapshot of one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    analysis_id: AnalysisId,
    target_year: i32,
    companies: Vec<Cik>,
    company_results: BTreeMap<Cik, CompanyOutcome>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl Checkpoint {
    /// Start a new run over `companies`. Duplicates are dropped, order kept.
    pub fn new(
        analysis_id: AnalysisId,
        target_year: i32,
        companies: impl IntoIterator<Item = Cik>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut checkpoint = Self {
            analysis_id,
            target_year,
            companies: Vec::new(),
            company_results: BTreeMap::new(),
            created_at: now,
            last_updated: now,
        };
        checkpoint.extend_companies(companies);
        checkpoint
    }

    pub fn analysis_id(&self) -> &AnalysisId {
        &self.analysis_id
    }

    pub fn target_year(&self) -> i32 {
        self.target_year
    }

    pub fn companies(&self) -> &[Cik] {
        &self.companies
    }

    pub fn company_results(&self) -> &BTreeMap<Cik, CompanyOutcome> {
        &self.company_results
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn total_companies(&self) -> usize {
        self.companies.len()
    }

    pub fn completed_companies(&self) -> usize {
        self.company_results.len()
    }

    pub fn progress_percentage(&self) -> f64 {
        progress(self.completed_companies(), self.total_companies())
    }

    pub fn is_complete(&self) -> bool {
        self.completed_companies() >= self.total_companies()
    }

    pub fn is_done(&self, cik: &Cik) -> bool {
        self.company_results.contains_key(cik)
    }

    /// Companies whose recorded outcome is a failure.
    pub fn failed_companies(&self) -> Vec<Cik> {
        self.company_results
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(cik, _)| cik.clone())
            .collect()
    }

    /// Add companies to the run. Already-known companies are ignored.
    pub fn extend_companies(&mut self, companies: impl IntoIterator<Item = Cik>) {
        let mut seen: HashSet<Cik> = self.companies.iter().cloned().collect();
        for cik in companies {
            if seen.insert(cik.clone()) {
                self.companies.push(cik);
            }
        }
    }

    /// Record the outcome for a company.
    ///
    /// A later outcome replaces an earlier one for the same company, so the
    /// completed count never decreases. `last_updated` never moves backwards.
    pub fn record(
        &mut self,
        cik: Cik,
        outcome: CompanyOutcome,
        now: DateTime<Utc>,
    ) -> CheckpointResult<()> {
        if !self.companies.contains(&cik) {
            return Err(CheckpointError::UnknownCompany {
                analysis_id: self.analysis_id.to_string(),
                cik: cik.to_string(),
            });
        }
        self.company_results.insert(cik, outcome);
        self.last_updated = self.last_updated.max(now);
        Ok(())
    }

    /// Companies from `requested` that still need processing.
    pub fn remaining<'a>(
        &self,
        requested: impl IntoIterator<Item = &'a Cik>,
        retry_failed: bool,
    ) -> Vec<Cik> {
        requested
            .into_iter()
            .filter(|cik| match self.company_results.get(cik) {
                None => true,
                Some(outcome) => retry_failed && outcome.is_failed(),
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RunStats {
        self.company_results
            .values()
            .fold(RunStats::default(), |mut stats, outcome| {
                match outcome {
                    CompanyOutcome::Completed { records, .. } => {
                        stats.succeeded += 1;
                        stats.records += records.len();
                    }
                    CompanyOutcome::Failed { .. } => stats.failed += 1,
                }
                stats
            })
    }

    /// All records collected so far.
    pub fn records(&self) -> impl Iterator<Item = &ExtractedRecord> {
        self.company_results.values().flat_map(|o| o.records())
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            analysis_id: self.analysis_id.clone(),
            target_year: self.target_year,
            total_companies: self.total_companies(),
            completed_companies: self.completed_companies(),
            stats: self.stats(),
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
    }
}

fn progress(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed as f64 / total as f64 * 100.0
}

/// Lightweight view of a checkpoint, without per-company results.
///
/// Deserializes directly from a persisted checkpoint document; the heavy
/// fields are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub analysis_id: AnalysisId,
    pub target_year: i32,
    pub total_companies: usize,
    pub completed_companies: usize,
    #[serde(default)]
    pub stats: RunStats,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CheckpointSummary {
    pub fn progress_percentage(&self) -> f64 {
        progress(self.completed_companies, self.total_companies)
    }

    pub fn is_complete(&self) -> bool {
        self.progress_percentage() >= 100.0
    }
}

// Persisted form. Derived counts are written so summaries can be read
// without walking the results, and are checked on load.

#[derive(Serialize)]
struct PersistedRef<'a> {
    analysis_id: &'a AnalysisId,
    target_year: i32,
    total_companies: usize,
    completed_companies: usize,
    progress_percentage: f64,
    stats: RunStats,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    companies: &'a [Cik],
    company_results: &'a BTreeMap<Cik, CompanyOutcome>,
}

#[derive(Deserialize)]
struct Persisted {
    analysis_id: AnalysisId,
    target_year: i32,
    total_companies: usize,
    completed_companies: usize,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    companies: Vec<Cik>,
    #[serde(default)]
    company_results: BTreeMap<Cik, CompanyOutcome>,
}

impl Serialize for Checkpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PersistedRef {
            analysis_id: &self.analysis_id,
            target_year: self.target_year,
            total_companies: self.total_companies(),
            completed_companies: self.completed_companies(),
            progress_percentage: self.progress_percentage(),
            stats: self.stats(),
            created_at: self.created_at,
            last_updated: self.last_updated,
            companies: &self.companies,
            company_results: &self.company_results,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Checkpoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let persisted = Persisted::deserialize(deserializer)?;
        Checkpoint::from_persisted(persisted).map_err(serde::de::Error::custom)
    }
}

impl Checkpoint {
    /// Rebuild from the persisted form, rejecting documents whose stored
    /// counts or keys contradict the data.
    fn from_persisted(p: Persisted) -> CheckpointResult<Self> {
        let known: HashSet<&Cik> = p.companies.iter().collect();
        if known.len() != p.companies.len() {
            return Err(CheckpointError::Invalid(
                "duplicate company in company list".into(),
            ));
        }
        if let Some(stray) = p.company_results.keys().find(|cik| !known.contains(cik)) {
            return Err(CheckpointError::Invalid(format!(
                "result for {} outside company list",
                stray
            )));
        }
        if p.total_companies != p.companies.len()
            || p.completed_companies != p.company_results.len()
        {
            return Err(CheckpointError::Invalid(format!(
                "counts {}/{} disagree with stored data {}/{}",
                p.completed_companies,
                p.total_companies,
                p.company_results.len(),
                p.companies.len()
            )));
        }

        Ok(Self {
            analysis_id: p.analysis_id,
            target_year: p.target_year,
            companies: p.companies,
            company_results: p.company_results,
            created_at: p.created_at,
            last_updated: p.last_updated,
        })
    }
}
