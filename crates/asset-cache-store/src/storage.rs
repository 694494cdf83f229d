//! Storage traits shared by the file and memory backends

use crate::error::{CacheStoreError, Result};
use crate::types::{CacheStats, StoredResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// A single named cache partition
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    /// Look up a stored response. Counts a hit or a miss.
    async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>>;

    /// Store a response, overwriting any previous entry for the key
    async fn put(&self, key: &str, response: StoredResponse) -> Result<()>;

    /// Remove an entry. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys, sorted
    async fn keys(&self) -> Result<Vec<String>>;

    async fn stats(&self) -> CacheStats;
}

/// A set of named cache partitions
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a partition, creating it when missing
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>>;

    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a partition and everything in it. Returns whether it existed.
    ///
    /// Handles opened before the delete stop serving entries and reject
    /// writes; a later [`CacheStorage::open`] creates a fresh partition.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of existing partitions, sorted
    async fn names(&self) -> Result<Vec<String>>;
}

/// Partition names become directory names, so keep them to a single path segment
pub fn validate_partition_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(CacheStoreError::InvalidName(name.to_string()))
    }
}
