//! Response bodies for the offline cache proxy

use asset_cache_store::CacheStats;
use offline_reconciler::WorkerState;
use serde::Serialize;
use std::collections::BTreeMap;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub worker: WorkerState,
    pub controls_clients: bool,
    pub manifest_entries: usize,
    /// Stats per existing cache partition
    pub caches: BTreeMap<String, CacheStats>,
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub state: WorkerState,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub accepted: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let mut caches = BTreeMap::new();
        caches.insert(
            "offline-app-cache".to_string(),
            CacheStats {
                entries: 5,
                total_size: 2_500_000,
                hits: 40,
                misses: 3,
            },
        );

        let response = HealthResponse {
            status: "ok".to_string(),
            uptime_secs: 3600,
            worker: WorkerState::Activated,
            controls_clients: true,
            manifest_entries: 42,
            caches,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"worker\":\"activated\""));
        assert!(json.contains("offline-app-cache"));
        assert!(json.contains("2500000"));
    }

    #[test]
    fn test_lifecycle_response_serialization() {
        let json = serde_json::to_string(&LifecycleResponse {
            state: WorkerState::Installed,
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"installed"}"#);
    }
}
