//! Checkpoint store trait.

use async_trait::async_trait;

use crate::error::CheckpointResult;
use crate::types::checkpoint::{AnalysisId, Checkpoint, CheckpointSummary};

/// Durable store of analysis checkpoints.
///
/// A single run owns its checkpoint for its lifetime; concurrent writers to
/// the same analysis id are not supported.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `checkpoint`, atomically replacing any previous version.
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()>;

    /// Load a checkpoint.
    ///
    /// Returns `None` when the id is unknown or was recorded for a different
    /// target year.
    async fn load(
        &self,
        analysis_id: &AnalysisId,
        target_year: i32,
    ) -> CheckpointResult<Option<Checkpoint>>;

    /// Summaries of every stored checkpoint.
    async fn list(&self) -> CheckpointResult<Vec<CheckpointSummary>>;

    /// Summaries for one target year.
    async fn list_for_year(&self, target_year: i32) -> CheckpointResult<Vec<CheckpointSummary>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| s.target_year == target_year)
            .collect())
    }
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<T> {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        (**self).save(checkpoint).await
    }

    async fn load(
        &self,
        analysis_id: &AnalysisId,
        target_year: i32,
    ) -> CheckpointResult<Option<Checkpoint>> {
        (**self).load(analysis_id, target_year).await
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointSummary>> {
        (**self).list().await
    }
}
