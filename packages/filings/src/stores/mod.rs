//! Storage implementations for the filings pipeline.
//!
//! Available backends:
//! - `MemoryCacheBackend` / `MemoryCheckpointStore` - in-memory (tests, ephemeral runs)
//! - `FileCacheBackend` / `FileCheckpointStore` - JSON files with atomic replace

mod atomic;
pub mod cache;
pub mod file_cache;
pub mod file_checkpoint;
pub mod memory;

pub use cache::{Cache, CacheCategory, CacheKey};
pub use file_cache::FileCacheBackend;
pub use file_checkpoint::FileCheckpointStore;
pub use memory::{MemoryCacheBackend, MemoryCheckpointStore};
