//! File-backed cache slots: one JSON file per slot.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::stores::atomic::{is_json_file, write_atomic};
use crate::traits::cache::CacheBackend;

pub struct FileCacheBackend {
    dir: PathBuf,
}

impl FileCacheBackend {
    /// Open (creating if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    async fn read(&self, slot: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match tokio::fs::read(self.path_for(slot)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, slot: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        write_atomic(self.path_for(slot), bytes).await?;
        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), CacheError> {
        match tokio::fs::remove_file(self.path_for(slot)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn slots(&self) -> Result<Vec<String>, CacheError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut slots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_json_file(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slots.push(stem.to_string());
            }
        }
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stores::cache::{Cache, CacheKey};
    use crate::types::{cik::Cik, config::CacheConfig};
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_now();
        let key = CacheKey::company_facts(&Cik::parse("789019").unwrap());

        {
            let backend = FileCacheBackend::open(dir.path()).await.unwrap();
            let cache = Cache::new(Arc::new(backend), Arc::new(clock.clone()), CacheConfig::default());
            cache.put(&key, "{\"facts\":{}}".into()).await.unwrap();
        }

        let backend = FileCacheBackend::open(dir.path()).await.unwrap();
        let cache = Cache::new(Arc::new(backend), Arc::new(clock.clone()), CacheConfig::default());
        assert_eq!(cache.get(&key).await.as_deref(), Some("{\"facts\":{}}"));

        clock.advance(Duration::days(8));
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_truncated_file_is_miss_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_now();
        let backend = Arc::new(FileCacheBackend::open(dir.path()).await.unwrap());
        let cache = Cache::new(backend.clone(), Arc::new(clock), CacheConfig::default());
        let key = CacheKey::submissions(&Cik::parse("1").unwrap());

        cache.put(&key, "payload".into()).await.unwrap();
        let slot = backend.slots().await.unwrap().pop().unwrap();
        tokio::fs::write(backend.path_for(&slot), b"{\"key\": \"subm")
            .await
            .unwrap();

        assert_eq!(cache.get(&key).await, None);
        assert!(backend.slots().await.unwrap().is_empty());
    }
}
