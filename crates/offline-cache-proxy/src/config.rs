use crate::error::{ProxyError, Result};
use offline_reconciler::DEFAULT_CORE_RESOURCES;
use std::path::PathBuf;
use url::Url;

const DEFAULT_PORT: u16 = 3005;
const DEFAULT_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_MANIFEST_PATH: &str = "./build/web/asset-manifest.json";
const DEFAULT_CACHE_DIR: &str = "./cache/offline";
const DEFAULT_CACHE_PREFIX: &str = "offline";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Proxy configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Origin serving the application bundle
    pub origin: Url,
    /// JSON manifest of resource key to checksum for the deployed build
    pub manifest_path: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_prefix: String,
    pub core_resources: Vec<String>,
    pub skip_waiting: bool,
    pub fetch_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let origin_str = lookup("ORIGIN_URL").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let origin = Url::parse(&origin_str)
            .map_err(|e| ProxyError::Config(format!("invalid ORIGIN_URL {}: {}", origin_str, e)))?;

        let manifest_path = lookup("MANIFEST_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH));

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));

        let cache_prefix = lookup("CACHE_PREFIX")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());

        let core_resources = lookup("CORE_RESOURCES")
            .map(|s| {
                s.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_CORE_RESOURCES.iter().map(|r| r.to_string()).collect());

        let skip_waiting = lookup("SKIP_WAITING")
            .map(|s| !matches!(s.trim(), "0" | "false" | "no"))
            .unwrap_or(true);

        let fetch_timeout_secs = lookup("FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        Ok(Self {
            port,
            origin,
            manifest_path,
            cache_dir,
            cache_prefix,
            core_resources,
            skip_waiting,
            fetch_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ProxyConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProxyConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3005);
        assert_eq!(config.origin.as_str(), "http://localhost:8080/");
        assert_eq!(config.cache_dir, PathBuf::from("./cache/offline"));
        assert_eq!(config.cache_prefix, "offline");
        assert_eq!(config.core_resources.len(), DEFAULT_CORE_RESOURCES.len());
        assert!(config.skip_waiting);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("ORIGIN_URL", "https://survey.example.org"),
            ("CORE_RESOURCES", "index.html, main.dart.js,,"),
            ("SKIP_WAITING", "false"),
            ("CACHE_PREFIX", "survey"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.origin.host_str(), Some("survey.example.org"));
        assert_eq!(config.core_resources, vec!["index.html", "main.dart.js"]);
        assert!(!config.skip_waiting);
        assert_eq!(config.cache_prefix, "survey");
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = config_from(&[("PORT", "http"), ("FETCH_TIMEOUT_SECS", "-1")]).unwrap();
        assert_eq!(config.port, 3005);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_invalid_origin_is_an_error() {
        let result = config_from(&[("ORIGIN_URL", "not a url")]);
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }
}
