//! The offline cache worker
//!
//! Owns the cache storage and network seam for one application build and
//! reacts to lifecycle events:
//!
//! - install: stage the core resources in the temp partition
//! - activate: reconcile the content partition against the previous
//!   manifest, promote staged resources, persist the new manifest
//! - fetch: answer manifest resources from the content partition
//! - message: `skipWaiting` and `downloadOffline`

use crate::error::{ReconcilerError, Result};
use crate::event::{
    ControlMessage, Dispatched, FetchOutcome, FetchRequest, LifecycleEvent, ResponseSource,
};
use crate::fetcher::{FetchMode, ResourceFetcher};
use crate::key::{entry_url, origin_root, resource_key, ROOT_KEY};
use crate::manifest::Manifest;
use crate::plan::{plan_activation, ActivationPlan};
use crate::state::WorkerState;
use asset_cache_store::{Cache, CacheStorage, StoredResponse};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

/// Key of the single entry in the manifest partition
pub const MANIFEST_KEY: &str = "manifest";

/// Application shell files fetched before the worker can activate
pub const DEFAULT_CORE_RESOURCES: [&str; 5] = [
    "main.dart.js",
    "index.html",
    "flutter_bootstrap.js",
    "assets/AssetManifest.bin.json",
    "assets/FontManifest.json",
];

const MAX_CONCURRENT_FETCHES: usize = 8;

/// Names of the three cache partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    pub content: String,
    pub temp: String,
    pub manifest: String,
}

impl CacheNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            content: format!("{}-app-cache", prefix),
            temp: format!("{}-temp-cache", prefix),
            manifest: format!("{}-app-manifest", prefix),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.content, &self.temp, &self.manifest]
    }
}

impl Default for CacheNames {
    fn default() -> Self {
        Self::with_prefix("offline")
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin root the manifest keys are relative to
    pub origin: Url,
    pub manifest: Manifest,
    pub core: Vec<String>,
    pub cache_names: CacheNames,
    /// Activate as soon as install completes instead of waiting
    pub skip_waiting: bool,
}

impl WorkerConfig {
    pub fn new(origin: &Url, manifest: Manifest) -> Result<Self> {
        Ok(Self {
            origin: origin_root(origin)?,
            manifest,
            core: DEFAULT_CORE_RESOURCES.iter().map(|s| s.to_string()).collect(),
            cache_names: CacheNames::default(),
            skip_waiting: true,
        })
    }

    pub fn with_core<I, S>(mut self, core: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core = core.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache_names(mut self, cache_names: CacheNames) -> Self {
        self.cache_names = cache_names;
        self
    }

    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }
}

/// Offline cache worker for one manifest. Cheap to clone.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    config: WorkerConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn ResourceFetcher>,
    state: RwLock<WorkerState>,
    /// Held for the whole of an install or activation
    lifecycle: Mutex<()>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    /// Cache writes and fills that outlive the request that started them
    background: std::sync::Mutex<JoinSet<()>>,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        let skip_waiting = config.skip_waiting;
        Self {
            inner: Arc::new(WorkerInner {
                config,
                storage,
                fetcher,
                state: RwLock::new(WorkerState::Uninitialized),
                lifecycle: Mutex::new(()),
                skip_waiting: AtomicBool::new(skip_waiting),
                clients_claimed: AtomicBool::new(false),
                background: std::sync::Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.inner.storage
    }

    pub async fn state(&self) -> WorkerState {
        *self.inner.state.read().await
    }

    /// Whether this worker has taken control of clients
    pub fn controls_clients(&self) -> bool {
        self.inner.clients_claimed.load(Ordering::Acquire)
    }

    /// Route a lifecycle event to its handler
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<Dispatched> {
        match event {
            LifecycleEvent::Install => Ok(Dispatched::State(self.install().await?)),
            LifecycleEvent::Activate => Ok(Dispatched::State(self.activate().await?)),
            LifecycleEvent::Fetch(request) => {
                Ok(Dispatched::Fetch(self.handle_fetch(&request).await?))
            }
            LifecycleEvent::Message(message) => {
                self.handle_message(message).await?;
                Ok(Dispatched::State(self.state().await))
            }
        }
    }

    /// Stage the core resources, then activate right away if skip-waiting is set.
    ///
    /// On failure an active worker stays `Activated` and keeps serving its
    /// content partition; any other worker returns to `Uninitialized`. The
    /// caller decides whether to retry.
    pub async fn install(&self) -> Result<WorkerState> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let previous = self.transition(
            WorkerState::can_install,
            "uninitialized, installed or activated",
            WorkerState::Installing,
        )
        .await?;
        info!(core = self.inner.config.core.len(), "Installing worker");

        match self.stage_core().await {
            Ok(staged) => {
                self.set_state(WorkerState::Installed).await;
                info!(staged, "Worker installed");
            }
            Err(e) => {
                let fallback = match previous {
                    WorkerState::Activated => WorkerState::Activated,
                    _ => WorkerState::Uninitialized,
                };
                warn!(error = %e, state = %fallback, "Worker install failed");
                self.set_state(fallback).await;
                return Err(e);
            }
        }

        if self.inner.skip_waiting.load(Ordering::Acquire) {
            return self.activate_locked().await;
        }
        Ok(WorkerState::Installed)
    }

    pub async fn activate(&self) -> Result<WorkerState> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.activate_locked().await
    }

    /// Offer a client request to the worker
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        if !request.is_get() || !self.state().await.can_intercept_fetch() {
            return Ok(FetchOutcome::Passthrough);
        }

        let Some(key) = resource_key(&self.inner.config.origin, &request.url) else {
            return Ok(FetchOutcome::Passthrough);
        };
        if !self.inner.config.manifest.contains(&key) {
            debug!(key = %key, "Not a manifest resource");
            return Ok(FetchOutcome::Passthrough);
        }

        if key == ROOT_KEY {
            self.online_first(&key, &request.url).await
        } else {
            self.cache_first(&key, &request.url).await
        }
    }

    pub async fn handle_message(&self, message: ControlMessage) -> Result<()> {
        debug!(message = %message, "Received control message");

        match message {
            ControlMessage::SkipWaiting => {
                self.inner.skip_waiting.store(true, Ordering::Release);
                if self.state().await.is_waiting() {
                    self.activate().await?;
                }
            }
            ControlMessage::DownloadOffline => {
                // Best effort: failures are logged, never reported to the sender
                let worker = self.clone();
                self.spawn_background(async move {
                    match worker.download_offline().await {
                        Ok(fetched) => {
                            info!(fetched = fetched.len(), "Offline download complete")
                        }
                        Err(e) => warn!(error = %e, "Offline download incomplete"),
                    }
                });
            }
        }

        Ok(())
    }

    /// Fetch and store every manifest resource missing from the content
    /// partition. Returns the keys that were stored.
    pub async fn download_offline(&self) -> Result<Vec<String>> {
        let content = self.open(&self.inner.config.cache_names.content).await?;
        let cached: HashSet<String> = content.keys().await?.into_iter().collect();
        let missing: Vec<String> = self
            .inner
            .config
            .manifest
            .keys()
            .filter(|key| !cached.contains(*key))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            return Ok(Vec::new());
        }
        debug!(missing = missing.len(), "Downloading resources for offline use");

        let results: Vec<(String, Result<StoredResponse>)> = stream::iter(missing)
            .map(|key| async move {
                let result = self.fetch_entry(&key, FetchMode::Default).await;
                (key, result)
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let mut fetched = Vec::new();
        let mut failed = Vec::new();
        for (key, result) in results {
            match result {
                Ok(response) => match content.put(&key, response).await {
                    Ok(()) => fetched.push(key),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to store offline resource");
                        failed.push(key);
                    }
                },
                Err(e) => {
                    debug!(key = %key, error = %e, "Offline download of resource failed");
                    failed.push(key);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            return Err(ReconcilerError::IncompleteFill { failed });
        }
        Ok(fetched)
    }

    /// Wait for background cache writes and fills to finish
    pub async fn wait_until_idle(&self) {
        loop {
            let mut tasks = std::mem::take(
                &mut *self
                    .inner
                    .background
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if tasks.is_empty() {
                return;
            }

            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background cache task failed");
                }
            }
        }
    }

    async fn activate_locked(&self) -> Result<WorkerState> {
        self.transition(
            WorkerState::can_activate,
            "installed",
            WorkerState::Activating,
        )
        .await?;

        match self.reconcile().await {
            Ok(plan) => {
                self.inner.clients_claimed.store(true, Ordering::Release);
                self.set_state(WorkerState::Activated).await;
                info!(
                    cold_start = plan.is_cold_start(),
                    retained = plan.retain.len(),
                    evicted = plan.evict.len(),
                    promoted = plan.promote.len(),
                    "Worker activated"
                );
                Ok(WorkerState::Activated)
            }
            Err(e) => {
                // A half-reconciled cache cannot be trusted
                error!(error = %e, "Failed to activate worker, clearing all caches");
                self.clear_caches().await;
                self.inner.clients_claimed.store(false, Ordering::Release);
                self.set_state(WorkerState::Uninitialized).await;
                Err(e)
            }
        }
    }

    async fn reconcile(&self) -> Result<ActivationPlan> {
        let names = &self.inner.config.cache_names;
        let storage = &self.inner.storage;

        let mut content = self.open(&names.content).await?;
        let temp = self.open(&names.temp).await?;
        let manifest_cache = self.open(&names.manifest).await?;

        let previous = match manifest_cache.match_key(MANIFEST_KEY).await? {
            Some(stored) => Some(Manifest::from_slice(&stored.body)?),
            None => None,
        };

        let plan = plan_activation(
            previous.as_ref(),
            &self.inner.config.manifest,
            &content.keys().await?,
            &temp.keys().await?,
        );

        if plan.reset_content {
            debug!(partition = %names.content, "No previous manifest, resetting content");
            storage.delete(&names.content).await?;
            content = self.open(&names.content).await?;
        }

        for key in &plan.evict {
            debug!(key = %key, "Evicting stale resource");
            content.delete(key).await?;
        }

        for key in &plan.promote {
            if let Some(response) = temp.match_key(key).await? {
                content.put(key, response).await?;
            }
        }

        storage.delete(&names.temp).await?;

        let manifest_json = self.inner.config.manifest.to_json()?;
        manifest_cache
            .put(MANIFEST_KEY, StoredResponse::json(manifest_json))
            .await?;

        Ok(plan)
    }

    async fn stage_core(&self) -> Result<usize> {
        let temp = self.open(&self.inner.config.cache_names.temp).await?;

        // All core resources must arrive before anything is staged
        let responses = try_join_all(self.inner.config.core.iter().map(|key| async move {
            let response = self.fetch_entry(key, FetchMode::Reload).await?;
            Ok::<_, ReconcilerError>((key, response))
        }))
        .await?;

        let staged = responses.len();
        for (key, response) in responses {
            temp.put(key, response).await?;
        }
        Ok(staged)
    }

    async fn cache_first(&self, key: &str, url: &Url) -> Result<FetchOutcome> {
        let content = self.open(&self.inner.config.cache_names.content).await?;

        if let Some(response) = content.match_key(key).await? {
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        let response = self.inner.fetcher.fetch(url, FetchMode::Default).await?;
        if response.is_success() {
            self.store_in_background(content, key, response.clone());
        }

        Ok(FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        })
    }

    async fn online_first(&self, key: &str, url: &Url) -> Result<FetchOutcome> {
        let content = self.open(&self.inner.config.cache_names.content).await?;

        match self.inner.fetcher.fetch(url, FetchMode::Default).await {
            Ok(response) => {
                self.store_in_background(content, key, response.clone());
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => match content.match_key(key).await? {
                Some(response) => {
                    debug!(key = %key, error = %e, "Network unavailable, serving cached copy");
                    Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::CacheFallback,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Fetch a manifest key, treating unsuccessful statuses as errors
    async fn fetch_entry(&self, key: &str, mode: FetchMode) -> Result<StoredResponse> {
        let url = entry_url(&self.inner.config.origin, key)?;
        let response = self.inner.fetcher.fetch(&url, mode).await?;

        if !response.is_success() {
            return Err(ReconcilerError::BadStatus {
                key: key.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    fn store_in_background(&self, cache: Arc<dyn Cache>, key: &str, response: StoredResponse) {
        let key = key.to_string();
        self.spawn_background(async move {
            if let Err(e) = cache.put(&key, response).await {
                warn!(key = %key, error = %e, "Failed to cache response");
            }
        });
    }

    fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Reap finished tasks so the set does not grow without bound
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    async fn clear_caches(&self) {
        for name in self.inner.config.cache_names.all() {
            if let Err(e) = self.inner.storage.delete(name).await {
                error!(partition = %name, error = %e, "Failed to delete cache partition");
            }
        }
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>> {
        Ok(self.inner.storage.open(name).await?)
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.inner.state.write().await;
        debug!(from = %state.as_str(), to = %next, "Worker state change");
        *state = next;
    }

    async fn transition(
        &self,
        allowed: fn(&WorkerState) -> bool,
        expected: &'static str,
        next: WorkerState,
    ) -> Result<WorkerState> {
        let mut state = self.inner.state.write().await;
        if !allowed(&*state) {
            return Err(ReconcilerError::InvalidState {
                expected,
                actual: *state,
            });
        }
        debug!(from = %state.as_str(), to = %next, "Worker state change");
        Ok(std::mem::replace(&mut *state, next))
    }
}
