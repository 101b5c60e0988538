//! Cache backend trait.
//!
//! Backends store opaque byte slots. Expiry, corruption handling and the
//! global toggle live in [`Cache`](crate::stores::cache::Cache), which is the
//! only type callers use directly.

use async_trait::async_trait;

use crate::error::CacheError;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a slot. `Ok(None)` when the slot does not exist.
    async fn read(&self, slot: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Write a slot, replacing any previous content atomically.
    async fn write(&self, slot: &str, bytes: Vec<u8>) -> Result<(), CacheError>;

    /// Remove a slot. Removing a missing slot is not an error.
    async fn remove(&self, slot: &str) -> Result<(), CacheError>;

    /// List every slot currently stored.
    async fn slots(&self) -> Result<Vec<String>, CacheError>;
}
