//! Resource manifest: resource key to content checksum

use crate::error::{ReconcilerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Checksums for every resource of one application build.
///
/// Keys are root-relative paths without a leading slash (`main.dart.js`),
/// except the entry document which uses the literal key `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a flat JSON object of string values
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_slice(json.as_bytes())
    }

    pub fn from_slice(json: &[u8]) -> Result<Self> {
        serde_json::from_slice(json).map_err(|e| ReconcilerError::Manifest(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ReconcilerError::Manifest(e.to_string()))
    }

    pub fn checksum(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `key` is in this manifest with the same checksum it has in `previous`
    pub fn unchanged_since(&self, previous: &Manifest, key: &str) -> bool {
        match (self.checksum(key), previous.checksum(key)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }
}
