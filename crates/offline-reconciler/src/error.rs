//! Error types for the offline reconciler

use crate::state::WorkerState;
use asset_cache_store::CacheStoreError;
use std::fmt;

#[derive(Debug)]
pub enum ReconcilerError {
    Store(CacheStoreError),
    Http(Box<reqwest::Error>),
    Network(String),
    BadStatus { key: String, status: u16 },
    Manifest(String),
    InvalidUrl(String),
    InvalidState {
        expected: &'static str,
        actual: WorkerState,
    },
    IncompleteFill { failed: Vec<String> },
}

impl fmt::Display for ReconcilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcilerError::Store(err) => write!(f, "Cache store error: {}", err),
            ReconcilerError::Http(err) => write!(f, "HTTP error: {}", err),
            ReconcilerError::Network(msg) => write!(f, "Network error: {}", msg),
            ReconcilerError::BadStatus { key, status } => {
                write!(f, "Request for '{}' returned status {}", key, status)
            }
            ReconcilerError::Manifest(msg) => write!(f, "Manifest error: {}", msg),
            ReconcilerError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            ReconcilerError::InvalidState { expected, actual } => {
                write!(f, "Worker is {}, expected {}", actual, expected)
            }
            ReconcilerError::IncompleteFill { failed } => {
                write!(f, "Failed to fetch {} resource(s): {}", failed.len(), failed.join(", "))
            }
        }
    }
}

impl std::error::Error for ReconcilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcilerError::Store(err) => Some(err),
            ReconcilerError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<CacheStoreError> for ReconcilerError {
    fn from(err: CacheStoreError) -> Self {
        ReconcilerError::Store(err)
    }
}

impl From<reqwest::Error> for ReconcilerError {
    fn from(err: reqwest::Error) -> Self {
        ReconcilerError::Http(Box::new(err))
    }
}

impl From<url::ParseError> for ReconcilerError {
    fn from(err: url::ParseError) -> Self {
        ReconcilerError::InvalidUrl(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
