//! Partitioned blob cache storage
//!
//! A storage root holds any number of named caches ("partitions"). Each
//! partition maps a string key to a stored response (status, content type,
//! body). Partitions can be opened, enumerated and deleted as a whole,
//! which is what an offline asset cache needs to stage, promote and wipe
//! content between application builds.
//!
//! Two backends are provided: [`FileCacheStorage`] keeps blobs on disk with
//! JSON metadata sidecars so partitions survive restarts, and
//! [`MemoryCacheStorage`] keeps everything in memory.

pub mod error;
mod file;
mod memory;
mod storage;
mod types;

pub use error::{CacheStoreError, Result};
pub use file::{FileCache, FileCacheStorage};
pub use memory::{MemoryCache, MemoryCacheStorage};
pub use storage::{validate_partition_name, Cache, CacheStorage};
pub use types::{CacheEntry, CacheStats, StoredResponse};
