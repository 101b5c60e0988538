//! TTL cache over a pluggable byte-slot backend.
//!
//! Each entry is self-describing (key, write timestamp, TTL), so expiry can
//! be decided from the entry alone. Expired and undecodable entries are
//! misses and are deleted on sight.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::CacheError;
use crate::traits::cache::CacheBackend;
use crate::types::{cik::Cik, config::CacheConfig};

/// Category of cached data. Each category has its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    Submissions,
    CompanyFacts,
    FilingDocument,
    DerivedFacts,
}

impl CacheCategory {
    fn prefix(&self) -> &'static str {
        match self {
            CacheCategory::Submissions => "submissions",
            CacheCategory::CompanyFacts => "companyfacts",
            CacheCategory::FilingDocument => "document",
            CacheCategory::DerivedFacts => "facts",
        }
    }
}

/// Request identity: operation type plus normalized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: CacheCategory,
    key: String,
}

impl CacheKey {
    pub fn new(category: CacheCategory, id: impl fmt::Display) -> Self {
        Self {
            category,
            key: format!("{}:{}", category.prefix(), id),
        }
    }

    /// `submissions:<cik>`
    pub fn submissions(cik: &Cik) -> Self {
        Self::new(CacheCategory::Submissions, cik)
    }

    /// `companyfacts:<cik>`
    pub fn company_facts(cik: &Cik) -> Self {
        Self::new(CacheCategory::CompanyFacts, cik)
    }

    /// `document:<cik>:<accession>/<primary document>`
    pub fn filing_document(cik: &Cik, accession: &str, primary_document: &str) -> Self {
        Self::new(
            CacheCategory::FilingDocument,
            format!("{}:{}/{}", cik, accession, primary_document),
        )
    }

    /// `facts:<cik>:<year>` - records derived for one company and year.
    pub fn derived(cik: &Cik, fiscal_year: i32) -> Self {
        Self::new(CacheCategory::DerivedFacts, format!("{}:{}", cik, fiscal_year))
    }

    pub fn category(&self) -> CacheCategory {
        self.category
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Backend slot name. Hashed so any key is a safe file name.
    fn slot(&self) -> String {
        hex::encode(Sha256::digest(self.key.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    data: String,
    timestamp: DateTime<Utc>,
    /// `<= 0` never expires
    ttl_secs: i64,
}

impl CacheEntry {
    /// A TTL too large to represent as a duration never expires.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_secs <= 0 {
            return false;
        }
        Duration::try_seconds(self.ttl_secs).is_some_and(|ttl| now - self.timestamp > ttl)
    }
}

/// Outcome of reading one slot.
enum SlotState {
    Fresh(CacheEntry),
    Stale,
    Missing,
}

/// The cache store.
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            backend,
            clock,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Configured TTL for a category, in seconds.
    pub fn ttl_for(&self, category: CacheCategory) -> i64 {
        match category {
            CacheCategory::Submissions => self.config.submissions_ttl_secs,
            CacheCategory::CompanyFacts => self.config.company_facts_ttl_secs,
            CacheCategory::FilingDocument => self.config.filing_document_ttl_secs,
            CacheCategory::DerivedFacts => self.config.derived_ttl_secs,
        }
    }

    /// Read a value. Expired, corrupted or unreadable entries are misses.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        match self.read_slot(&key.slot(), Some(key.as_str())).await {
            SlotState::Fresh(entry) => {
                debug!(key = %key, "cache hit");
                Some(entry.data)
            }
            SlotState::Stale | SlotState::Missing => {
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    /// Write a value with an explicit TTL in seconds.
    pub async fn set(&self, key: &CacheKey, data: String, ttl_secs: i64) -> Result<(), CacheError> {
        if !self.config.enabled {
            return Ok(());
        }
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            data,
            timestamp: self.clock.now(),
            ttl_secs,
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.backend.write(&key.slot(), bytes).await
    }

    /// Write a value with its category's TTL.
    pub async fn put(&self, key: &CacheKey, data: String) -> Result<(), CacheError> {
        self.set(key, data, self.ttl_for(key.category())).await
    }

    /// Read and decode a JSON value. A payload that no longer decodes as `T`
    /// is treated as corrupted.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key = %key, error = %e, "cached payload does not decode, evicting");
                self.evict(&key.slot()).await;
                None
            }
        }
    }

    /// Encode and write a JSON value with its category's TTL.
    pub async fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError> {
        self.put(key, serde_json::to_string(value)?).await
    }

    pub async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.backend.remove(&key.slot()).await
    }

    /// Remove every entry. Returns the number removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let slots = self.backend.slots().await?;
        for slot in &slots {
            self.backend.remove(slot).await?;
        }
        Ok(slots.len())
    }

    /// Remove expired and corrupted entries. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for slot in self.backend.slots().await? {
            if let SlotState::Stale = self.read_slot(&slot, None).await {
                removed += 1;
            }
        }
        debug!(removed, "cache sweep complete");
        Ok(removed)
    }

    /// Read one slot, deleting it if stale. `expected_key` guards against
    /// slot collisions.
    async fn read_slot(&self, slot: &str, expected_key: Option<&str>) -> SlotState {
        let bytes = match self.backend.read(slot).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return SlotState::Missing,
            Err(e) => {
                warn!(slot, error = %e, "cache read failed, treating as miss");
                return SlotState::Missing;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(slot, error = %e, "corrupted cache entry, evicting");
                self.evict(slot).await;
                return SlotState::Stale;
            }
        };

        if let Some(expected) = expected_key {
            if entry.key != expected {
                return SlotState::Missing;
            }
        }

        if entry.is_expired(self.clock.now()) {
            self.evict(slot).await;
            return SlotState::Stale;
        }

        SlotState::Fresh(entry)
    }

    async fn evict(&self, slot: &str) {
        if let Err(e) = self.backend.remove(slot).await {
            warn!(slot, error = %e, "failed to evict cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::stores::memory::MemoryCacheBackend;

    fn cache_with(clock: &ManualClock, config: CacheConfig) -> (Cache, Arc<MemoryCacheBackend>) {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = Cache::new(backend.clone(), Arc::new(clock.clone()), config);
        (cache, backend)
    }

    fn key() -> CacheKey {
        CacheKey::submissions(&Cik::parse("320193").unwrap())
    }

    #[test]
    fn test_key_format() {
        let cik = Cik::parse("320193").unwrap();
        assert_eq!(CacheKey::submissions(&cik).as_str(), "submissions:0000320193");
        assert_eq!(CacheKey::company_facts(&cik).as_str(), "companyfacts:0000320193");
        assert_eq!(CacheKey::derived(&cik, 2024).as_str(), "facts:0000320193:2024");
        assert_eq!(
            CacheKey::filing_document(&cik, "0001-24-01", "a.htm").as_str(),
            "document:0000320193:0001-24-01/a.htm"
        );
    }

    #[tokio::test]
    async fn test_set_then_get_then_expire() {
        let clock = ManualClock::starting_now();
        let (cache, backend) = cache_with(&clock, CacheConfig::default());

        cache.set(&key(), "payload".into(), 60).await.unwrap();
        assert_eq!(cache.get(&key()).await.as_deref(), Some("payload"));

        clock.advance(Duration::seconds(60));
        assert_eq!(cache.get(&key()).await.as_deref(), Some("payload"));

        clock.advance(Duration::seconds(1));
        assert_eq!(cache.get(&key()).await, None);
        // Lazy eviction removed the stale entry.
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn test_non_positive_ttl_never_expires() {
        let clock = ManualClock::starting_now();
        let (cache, _) = cache_with(&clock, CacheConfig::default());

        cache.set(&key(), "static".into(), 0).await.unwrap();
        clock.advance(Duration::days(3650));
        assert_eq!(cache.get(&key()).await.as_deref(), Some("static"));

        cache.set(&key(), "static".into(), -5).await.unwrap();
        clock.advance(Duration::days(3650));
        assert_eq!(cache.get(&key()).await.as_deref(), Some("static"));
    }

    #[tokio::test]
    async fn test_huge_ttl_is_a_hit() {
        let clock = ManualClock::starting_now();
        let (cache, _) = cache_with(&clock, CacheConfig::default());

        cache.set(&key(), "long-lived".into(), i64::MAX).await.unwrap();
        clock.advance(Duration::days(3650));
        assert_eq!(cache.get(&key()).await.as_deref(), Some("long-lived"));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_miss_and_deleted() {
        let clock = ManualClock::starting_now();
        let (cache, backend) = cache_with(&clock, CacheConfig::default());

        backend.write(&key().slot(), b"{not json".to_vec()).await.unwrap();
        assert_eq!(cache.get(&key()).await, None);
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_json_payload_is_evicted() {
        let clock = ManualClock::starting_now();
        let (cache, backend) = cache_with(&clock, CacheConfig::default());

        cache.put(&key(), "\"a string, not a list\"".into()).await.unwrap();
        let decoded: Option<Vec<u32>> = cache.get_json(&key()).await;
        assert_eq!(decoded, None);
        assert_eq!(backend.len(), 0);
    }

    #[tokio::test]
    async fn test_disabled_cache_misses_without_deleting() {
        let clock = ManualClock::starting_now();
        let backend = Arc::new(MemoryCacheBackend::new());
        let enabled = Cache::new(backend.clone(), Arc::new(clock.clone()), CacheConfig::default());
        enabled.set(&key(), "kept".into(), 0).await.unwrap();

        let disabled = Cache::new(backend.clone(), Arc::new(clock.clone()), CacheConfig::disabled());
        assert_eq!(disabled.get(&key()).await, None);
        disabled.set(&key(), "ignored".into(), 0).await.unwrap();

        assert_eq!(backend.len(), 1);
        assert_eq!(enabled.get(&key()).await.as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_sweep_and_clear() {
        let clock = ManualClock::starting_now();
        let (cache, backend) = cache_with(&clock, CacheConfig::default());
        let cik = Cik::parse("1").unwrap();

        cache.set(&CacheKey::submissions(&cik), "a".into(), 10).await.unwrap();
        cache.set(&CacheKey::company_facts(&cik), "b".into(), 1000).await.unwrap();
        cache.set(&CacheKey::derived(&cik, 2024), "c".into(), 0).await.unwrap();
        backend.write("garbage", b"\x00\x01".to_vec()).await.unwrap();

        clock.advance(Duration::seconds(11));
        assert_eq!(cache.sweep_expired().await.unwrap(), 2);
        assert_eq!(backend.len(), 2);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(backend.len(), 0);
    }
}
