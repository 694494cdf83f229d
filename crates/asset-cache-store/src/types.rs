//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A response as held by a cache partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// A `200 OK` response
    pub fn ok(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, content_type, body)
    }

    /// A `200 OK` JSON response
    pub fn json(body: impl Into<Vec<u8>>) -> Self {
        Self::ok("application/json", body)
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

impl Default for StoredResponse {
    fn default() -> Self {
        Self::ok(DEFAULT_CONTENT_TYPE, Vec::new())
    }
}

/// Metadata for a cached entry, persisted next to the blob by the file backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub status: u16,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Statistics about a cache partition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
}
