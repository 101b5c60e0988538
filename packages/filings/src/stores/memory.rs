//! In-memory storage implementations for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{CacheError, CheckpointResult};
use crate::traits::{cache::CacheBackend, checkpoint::CheckpointStore};
use crate::types::checkpoint::{AnalysisId, Checkpoint, CheckpointSummary};

/// In-memory cache slots.
///
/// Useful for testing and for runs that should not touch disk. Data is lost
/// on restart.
#[derive(Default)]
pub struct MemoryCacheBackend {
    slots: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored slots.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn read(&self, slot: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot)
            .cloned())
    }

    async fn write(&self, slot: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), CacheError> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(slot);
        Ok(())
    }

    async fn slots(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

/// In-memory checkpoint store.
///
/// Keeps every saved version's latest state, plus a save counter so tests
/// can assert how often a run flushed.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<AnalysisId, Checkpoint>>,
    saves: RwLock<Vec<CheckpointSummary>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing checkpoint.
    pub fn with_checkpoint(self, checkpoint: Checkpoint) -> Self {
        self.checkpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(checkpoint.analysis_id().clone(), checkpoint);
        self
    }

    /// Summary of every save, in order.
    pub fn save_history(&self) -> Vec<CheckpointSummary> {
        self.saves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, analysis_id: &AnalysisId) -> Option<Checkpoint> {
        self.checkpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(analysis_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.checkpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        self.checkpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(checkpoint.analysis_id().clone(), checkpoint.clone());
        self.saves
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(checkpoint.summary());
        Ok(())
    }

    async fn load(
        &self,
        analysis_id: &AnalysisId,
        target_year: i32,
    ) -> CheckpointResult<Option<Checkpoint>> {
        Ok(self
            .get(analysis_id)
            .filter(|c| c.target_year() == target_year))
    }

    async fn list(&self) -> CheckpointResult<Vec<CheckpointSummary>> {
        Ok(self
            .checkpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Checkpoint::summary)
            .collect())
    }
}
