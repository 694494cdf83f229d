//! File-based partition storage with in-memory metadata
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<partition>/<sha256(key)>        blob
//! <root>/<partition>/<sha256(key)>.json   CacheEntry sidecar
//! ```

use crate::error::{CacheStoreError, Result};
use crate::storage::{validate_partition_name, Cache, CacheStorage};
use crate::types::{CacheEntry, CacheStats, StoredResponse};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const METADATA_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Storage root holding one directory per partition
pub struct FileCacheStorage {
    root: PathBuf,
    /// Partitions opened by this process
    partitions: RwLock<HashMap<String, Arc<FileCache>>>,
}

impl FileCacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// Initialize the storage by ensuring the root directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "Cache storage initialized");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CacheStorage for FileCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        validate_partition_name(name)?;

        {
            let partitions = self.partitions.read().await;
            if let Some(cache) = partitions.get(name) {
                return Ok(cache.clone() as Arc<dyn Cache>);
            }
        }

        let mut partitions = self.partitions.write().await;
        if let Some(cache) = partitions.get(name) {
            return Ok(cache.clone() as Arc<dyn Cache>);
        }

        let cache = Arc::new(FileCache::load(name, self.root.join(name)).await?);
        partitions.insert(name.to_string(), cache.clone());
        Ok(cache as Arc<dyn Cache>)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        validate_partition_name(name)?;
        let dir = self.root.join(name);
        Ok(fs::try_exists(&dir).await? && fs::metadata(&dir).await?.is_dir())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        validate_partition_name(name)?;

        let removed = self.partitions.write().await.remove(name);
        if let Some(cache) = &removed {
            cache.mark_deleted().await;
        }

        let dir = self.root.join(name);
        let existed = fs::try_exists(&dir).await?;
        if existed {
            fs::remove_dir_all(&dir).await?;
        }

        if existed || removed.is_some() {
            debug!(partition = %name, "Deleted cache partition");
        }
        Ok(existed || removed.is_some())
    }

    async fn names(&self) -> Result<Vec<String>> {
        if !fs::try_exists(&self.root).await? {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut read_dir = fs::read_dir(&self.root).await?;
        while let Some(dirent) = read_dir.next_entry().await? {
            if !dirent.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = dirent.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A single partition stored as blob files plus metadata sidecars
pub struct FileCache {
    name: String,
    dir: PathBuf,
    /// In-memory metadata for stored entries, keyed by cache key
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Current total size of stored blobs
    current_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Set once the owning storage deletes this partition
    deleted: AtomicBool,
    /// Held while an entry's files and index record change
    writes: Mutex<()>,
}

impl FileCache {
    /// Open a partition directory, loading metadata for entries already on disk
    async fn load(name: &str, dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;

        let mut entries = HashMap::new();
        let mut total_size = 0;
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(dirent) = read_dir.next_entry().await? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
                continue;
            }

            match read_metadata(&path).await {
                Ok(mut entry) => {
                    // The storage root may have moved since the sidecar was written
                    entry.path = dir.join(Self::blob_name(&entry.key));
                    total_size += entry.size;
                    entries.insert(entry.key.clone(), entry);
                }
                Err(e) => {
                    warn!(path = ?path, error = %e, "Skipping unreadable cache metadata");
                }
            }
        }

        debug!(partition = %name, entries = entries.len(), total_size, "Opened cache partition");

        Ok(Self {
            name: name.to_string(),
            dir,
            entries: RwLock::new(entries),
            current_size: AtomicU64::new(total_size),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            deleted: AtomicBool::new(false),
            writes: Mutex::new(()),
        })
    }

    /// File name used for a key's blob
    pub fn blob_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn metadata_path(&self, blob_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", blob_name, METADATA_EXTENSION))
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    async fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
        self.entries.write().await.clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Drop an entry from the index and remove its files
    async fn remove_entry(&self, key: &str) -> Option<CacheEntry> {
        let _writes = self.writes.lock().await;
        let entry = {
            let mut entries = self.entries.write().await;
            entries.remove(key)
        };

        if let Some(entry) = &entry {
            self.current_size.fetch_sub(entry.size, Ordering::Relaxed);

            // Files may already be gone (ignore errors)
            let _ = fs::remove_file(&entry.path).await;
            let _ = fs::remove_file(self.metadata_path(&Self::blob_name(key))).await;
        }

        entry
    }
}

#[async_trait]
impl Cache for FileCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &str) -> Result<Option<StoredResponse>> {
        let entry = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };

        if let Some(entry) = entry {
            match fs::read(&entry.path).await {
                Ok(body) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(partition = %self.name, key = %key, "Cache hit");
                    return Ok(Some(StoredResponse {
                        status: entry.status,
                        content_type: entry.content_type,
                        body,
                    }));
                }
                Err(e) => {
                    warn!(
                        partition = %self.name,
                        key = %key,
                        error = %e,
                        "Failed to read cached file, removing entry"
                    );
                    self.remove_entry(key).await;
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn put(&self, key: &str, response: StoredResponse) -> Result<()> {
        if self.is_deleted() {
            return Err(CacheStoreError::PartitionDeleted(self.name.clone()));
        }

        let blob_name = Self::blob_name(key);
        let path = self.dir.join(&blob_name);
        let size = response.size();

        let _writes = self.writes.lock().await;
        write_replace(&path, &response.body).await?;

        let entry = CacheEntry {
            key: key.to_string(),
            path,
            status: response.status,
            content_type: response.content_type,
            size,
            created_at: Utc::now(),
        };
        write_replace(&self.metadata_path(&blob_name), &serde_json::to_vec(&entry)?).await?;

        let previous = {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), entry)
        };

        if let Some(previous) = previous {
            self.current_size.fetch_sub(previous.size, Ordering::Relaxed);
        }
        self.current_size.fetch_add(size, Ordering::Relaxed);
        debug!(partition = %self.name, key = %key, size, "Stored entry");

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.remove_entry(key).await.is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            total_size: self.current_size.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Write to a temporary sibling, then rename over `path`
async fn write_replace(path: &Path, contents: &[u8]) -> Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".");
    temp.push(TEMP_EXTENSION);
    let temp = PathBuf::from(temp);

    fs::write(&temp, contents).await?;
    fs::rename(&temp, path).await?;
    Ok(())
}

async fn read_metadata(path: &Path) -> Result<CacheEntry> {
    let raw = fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> FileCacheStorage {
        let storage = FileCacheStorage::new(dir.to_path_buf());
        storage.init().await.unwrap();
        storage
    }

    #[test]
    fn test_blob_name_generation() {
        let key1 = FileCache::blob_name("main.dart.js");
        let key2 = FileCache::blob_name("main.dart.js");
        let key3 = FileCache::blob_name("index.html");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);

        // Hex strings, 64 chars for SHA256
        assert_eq!(key1.len(), 64);
        assert!(key1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();

        cache
            .put("index.html", StoredResponse::ok("text/html", "<html></html>"))
            .await
            .unwrap();

        let response = cache.match_key("index.html").await.unwrap().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(response.body, b"<html></html>");
    }

    #[tokio::test]
    async fn test_miss_and_counters() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();

        assert!(cache.match_key("missing.js").await.unwrap().is_none());
        cache
            .put("app.js", StoredResponse::ok("text/javascript", "x"))
            .await
            .unwrap();
        cache.match_key("app.js").await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_overwrite_tracks_size() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();

        cache
            .put("a.js", StoredResponse::ok("text/javascript", "0123456789"))
            .await
            .unwrap();
        cache
            .put("a.js", StoredResponse::ok("text/javascript", "abc"))
            .await
            .unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_size, 3);
        assert_eq!(cache.match_key("a.js").await.unwrap().unwrap().body, b"abc");
    }

    #[tokio::test]
    async fn test_concurrent_overwrites_keep_blob_and_metadata_in_step() {
        let dir = tempdir().unwrap();

        {
            let storage = storage(dir.path()).await;
            let cache = storage.open("content").await.unwrap();

            let mut tasks = tokio::task::JoinSet::new();
            for len in 1..=32usize {
                let cache = cache.clone();
                tasks.spawn(async move {
                    let body = "x".repeat(len * 100);
                    cache
                        .put("main.dart.js", StoredResponse::ok("text/javascript", body))
                        .await
                        .unwrap();
                });
            }
            while let Some(result) = tasks.join_next().await {
                result.unwrap();
            }

            let body = cache.match_key("main.dart.js").await.unwrap().unwrap().body;
            let stats = cache.stats().await;
            assert_eq!(stats.entries, 1);
            assert_eq!(stats.total_size, body.len() as u64);
        }

        // The sidecar on disk describes the blob that won
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();
        let body = cache.match_key("main.dart.js").await.unwrap().unwrap().body;
        assert_eq!(cache.stats().await.total_size, body.len() as u64);

        let mut leftovers = fs::read_dir(dir.path().join("content")).await.unwrap();
        while let Some(dirent) = leftovers.next_entry().await.unwrap() {
            let path = dirent.path();
            assert_ne!(
                path.extension().and_then(|e| e.to_str()),
                Some(TEMP_EXTENSION),
                "temporary file left behind: {:?}",
                path
            );
        }
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();

        cache
            .put("a.js", StoredResponse::ok("text/javascript", "a"))
            .await
            .unwrap();

        assert!(cache.delete("a.js").await.unwrap());
        assert!(!cache.delete("a.js").await.unwrap());
        assert!(cache.keys().await.unwrap().is_empty());
        assert_eq!(cache.stats().await.total_size, 0);
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();

        for key in ["main.dart.js", "/", "assets/FontManifest.json"] {
            cache.put(key, StoredResponse::default()).await.unwrap();
        }

        assert_eq!(
            cache.keys().await.unwrap(),
            vec!["/", "assets/FontManifest.json", "main.dart.js"]
        );
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();

        {
            let storage = storage(dir.path()).await;
            let cache = storage.open("manifest").await.unwrap();
            cache
                .put("manifest", StoredResponse::json(r#"{"/":"abc"}"#))
                .await
                .unwrap();
        }

        let storage = storage(dir.path()).await;
        assert!(storage.has("manifest").await.unwrap());
        let cache = storage.open("manifest").await.unwrap();
        let response = cache.match_key("manifest").await.unwrap().unwrap();
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body, br#"{"/":"abc"}"#);
        assert_eq!(cache.stats().await.total_size, 11);
    }

    #[tokio::test]
    async fn test_delete_partition() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("temp").await.unwrap();
        cache
            .put("index.html", StoredResponse::ok("text/html", "hi"))
            .await
            .unwrap();

        assert!(storage.delete("temp").await.unwrap());
        assert!(!storage.has("temp").await.unwrap());
        assert!(!storage.delete("temp").await.unwrap());

        // Stale handle no longer serves or accepts entries
        assert!(cache.match_key("index.html").await.unwrap().is_none());
        assert!(matches!(
            cache.put("x", StoredResponse::default()).await,
            Err(CacheStoreError::PartitionDeleted(_))
        ));

        // Reopening yields an empty partition
        let reopened = storage.open("temp").await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_names_enumerates_partitions() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        assert!(storage.names().await.unwrap().is_empty());

        storage.open("b-cache").await.unwrap();
        storage.open("a-cache").await.unwrap();

        assert_eq!(storage.names().await.unwrap(), vec!["a-cache", "b-cache"]);
    }

    #[tokio::test]
    async fn test_missing_blob_is_a_miss() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();
        cache
            .put("a.js", StoredResponse::ok("text/javascript", "a"))
            .await
            .unwrap();

        let blob = dir.path().join("content").join(FileCache::blob_name("a.js"));
        std::fs::remove_file(blob).unwrap();

        assert!(cache.match_key("a.js").await.unwrap().is_none());
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_skipped() {
        let dir = tempdir().unwrap();
        let partition = dir.path().join("content");
        std::fs::create_dir_all(&partition).unwrap();
        std::fs::write(partition.join("deadbeef.json"), b"not json").unwrap();

        let storage = storage(dir.path()).await;
        let cache = storage.open("content").await.unwrap();
        assert!(cache.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_partition_name_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert!(matches!(
            storage.open("../escape").await,
            Err(CacheStoreError::InvalidName(_))
        ));
    }
}
