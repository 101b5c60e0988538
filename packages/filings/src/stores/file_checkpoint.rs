//! File-backed checkpoint store: one JSON document per analysis id.
//!
//! Saves go through an atomic rename, so a reader (including `list` while a
//! run is in progress) always sees a complete document.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{CheckpointError, CheckpointResult};
use crate::stores::atomic::{is_json_file, write_atomic};
use crate::traits::checkpoint::CheckpointStore;
use crate::types::checkpoint::{AnalysisId, Checkpoint, CheckpointSummary};

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory.
    pub async fn open(dir: impl Into<PathBuf>) -> CheckpointResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| CheckpointError::Unwritable {
                path: dir.display().to_string(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, analysis_id: &AnalysisId) -> PathBuf {
        let name: String = analysis_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        let path = self.path_for(checkpoint.analysis_id());
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(path.clone(), bytes)
            .await
            .map_err(|source| CheckpointError::Unwritable {
                path: path.display().to_string(),
                source,
            })?;
        debug!(
            analysis_id = %checkpoint.analysis_id(),
            completed = checkpoint.completed_companies(),
            total = checkpoint.total_companies(),
            "checkpoint saved"
        );
        Ok(())
    }

    async fn load(
        &self,
        analysis_id: &AnalysisId,
        target_year: i32,
    ) -> CheckpointResult<Option<Checkpoint>> {
        let bytes = match tokio::fs::read(self.path_for(analysis_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        if checkpoint.analysis_id() != analysis_id || checkpoint.target_year() != target_year {
            return Ok(None);
        }
        Ok(Some(checkpoint))
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointSummary>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_json_file(&path) {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable checkpoint, skipping");
                    continue;
                }
            };
            match serde_json::from_slice::<CheckpointSummary>(&bytes) {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "undecodable checkpoint, skipping")
                }
            }
        }
        summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(summaries)
    }
}
