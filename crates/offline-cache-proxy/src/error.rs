//! Error types for the offline cache proxy

use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Reconciler(offline_reconciler::ReconcilerError),
    Store(asset_cache_store::CacheStoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Reconciler(err) => write!(f, "Reconciler error: {}", err),
            ProxyError::Store(err) => write!(f, "Cache store error: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Reconciler(err) => Some(err),
            ProxyError::Store(err) => Some(err),
            ProxyError::Io(err) => Some(err.as_ref()),
            ProxyError::Config(_) => None,
        }
    }
}

impl From<offline_reconciler::ReconcilerError> for ProxyError {
    fn from(err: offline_reconciler::ReconcilerError) -> Self {
        ProxyError::Reconciler(err)
    }
}

impl From<asset_cache_store::CacheStoreError> for ProxyError {
    fn from(err: asset_cache_store::CacheStoreError) -> Self {
        ProxyError::Store(err)
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
