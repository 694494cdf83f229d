//! Offline Cache Proxy - serves an application bundle from a manifest-reconciled cache
//!
//! Hosts the offline cache worker behind an HTTP front: manifest resources
//! are answered cache-first (the entry document online-first), everything
//! else is forwarded to the origin.

mod config;
mod error;
mod server;
mod types;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::server::{start_server, ServerState, SharedState};
use asset_cache_store::{CacheStorage, FileCacheStorage};
use offline_reconciler::{
    CacheNames, Dispatched, HttpFetcher, LifecycleEvent, Manifest, ResourceFetcher, Worker,
    WorkerConfig, WorkerState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = env_filter()?;

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Offline Cache Proxy...");

    let config = ProxyConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Origin: {}", config.origin);
    info!("Manifest: {:?}", config.manifest_path);
    info!("Cache dir: {:?}", config.cache_dir);

    let manifest_json = tokio::fs::read(&config.manifest_path).await?;
    let manifest = Manifest::from_slice(&manifest_json)?;
    info!("Manifest entries: {}", manifest.len());

    let storage = FileCacheStorage::new(&config.cache_dir);
    storage.init().await?;
    let storage: Arc<dyn CacheStorage> = Arc::new(storage);

    let fetcher: Arc<dyn ResourceFetcher> = Arc::new(HttpFetcher::with_timeout(
        Duration::from_secs(config.fetch_timeout_secs),
    )?);

    let worker_config = WorkerConfig::new(&config.origin, manifest)?
        .with_core(config.core_resources.iter().cloned())
        .with_cache_names(CacheNames::with_prefix(&config.cache_prefix))
        .with_skip_waiting(config.skip_waiting);
    let worker = Worker::new(worker_config, storage, fetcher.clone());

    bring_up(&worker).await;

    let state: SharedState = Arc::new(ServerState::new(worker.clone(), fetcher));

    // Serve until ctrl-c
    start_server(state, config.port)
        .await
        .map_err(|e| ProxyError::Config(format!("Server error: {}", e)))?;

    info!("Waiting for background cache work");
    worker.wait_until_idle().await;

    Ok(())
}

/// `RUST_LOG` plus info-level logging for the proxy and the worker
fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("offline_cache_proxy=info".parse()?)
        .add_directive("offline_reconciler=info".parse()?))
}

/// Install the worker and activate it if it is left waiting.
///
/// Failures are logged; the proxy still starts and passes every request
/// through until `POST /sw/install` succeeds.
async fn bring_up(worker: &Worker) {
    match worker.dispatch(LifecycleEvent::Install).await {
        Ok(Dispatched::State(WorkerState::Installed)) => {
            match worker.dispatch(LifecycleEvent::Activate).await {
                Ok(_) => info!("Worker activated"),
                Err(e) => warn!(error = %e, "Worker activation failed"),
            }
        }
        Ok(_) => info!(state = %worker.state().await, "Worker installed"),
        Err(e) => warn!(error = %e, "Worker install failed, serving from origin"),
    }
}
