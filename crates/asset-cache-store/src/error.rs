//! Error types for the cache store

use std::fmt;

#[derive(Debug)]
pub enum CacheStoreError {
    Io(Box<std::io::Error>),
    Serialization(String),
    InvalidName(String),
    PartitionDeleted(String),
}

impl fmt::Display for CacheStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStoreError::Io(err) => write!(f, "IO error: {}", err),
            CacheStoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheStoreError::InvalidName(name) => write!(f, "Invalid cache name: {:?}", name),
            CacheStoreError::PartitionDeleted(name) => {
                write!(f, "Cache '{}' has been deleted", name)
            }
        }
    }
}

impl std::error::Error for CacheStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheStoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheStoreError {
    fn from(err: std::io::Error) -> Self {
        CacheStoreError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheStoreError {
    fn from(err: serde_json::Error) -> Self {
        CacheStoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheStoreError>;
