//! In-memory partition storage

use crate::error::{CacheStoreError, Result};
use crate::storage::{validate_partition_name, Cache, CacheStorage};
use crate::types::{CacheStats, StoredResponse};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryCacheStorage {
    partitions: RwLock<BTreeMap<String, Arc<MemoryCache>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        validate_partition_name(name)?;

        let mut partitions = self.partitions.write().await;
        let cache = partitions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)))
            .clone();
        Ok(cache as Arc<dyn Cache>)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.partitions.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.partitions.write().await.remove(name);
        match removed {
            Some(cache) => {
                cache.mark_deleted().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.partitions.read().await.keys().cloned().collect())
    }
}

pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<String, StoredResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
    deleted: AtomicBool,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    async fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>> {
        let found = self.entries.read().await.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(found)
    }

    async fn put(&self, key: &str, response: StoredResponse) -> Result<()> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(CacheStoreError::PartitionDeleted(self.name.clone()));
        }
        self.entries.write().await.insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            total_size: entries.values().map(StoredResponse::size).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
