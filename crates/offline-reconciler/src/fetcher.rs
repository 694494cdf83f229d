//! Network access for the worker

use crate::error::Result;
use asset_cache_store::StoredResponse;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    #[default]
    Default,
    /// Bypass intermediate HTTP caches
    Reload,
}

/// Fetches resources from the network.
///
/// Non-2xx responses are returned as values; only transport failures are errors.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<StoredResponse>;
}

/// HTTP fetcher backed by reqwest
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, mode: FetchMode) -> Result<StoredResponse> {
        debug!(url = %url, mode = ?mode, "Fetching resource");

        let mut request = self.client.get(url.as_str());
        if mode == FetchMode::Reload {
            request = request
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let body = response.bytes().await?.to_vec();

        debug!(
            url = %url,
            status,
            size = body.len(),
            content_type = %content_type,
            "Fetched resource"
        );

        Ok(StoredResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode() {
        assert_eq!(FetchMode::default(), FetchMode::Default);
    }

    #[test]
    fn test_with_timeout_builds_client() {
        assert!(HttpFetcher::with_timeout(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(2)).unwrap();
        // Port 9 (discard) on localhost is closed on test machines
        let url = Url::parse("http://127.0.0.1:9/main.dart.js").unwrap();

        let result = fetcher.fetch(&url, FetchMode::Reload).await;
        assert!(result.is_err());
    }
}
