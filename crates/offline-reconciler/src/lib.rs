//! Offline asset cache reconciler
//!
//! Keeps a partitioned cache store synchronized with a content-addressed
//! manifest (resource key to checksum) and serves manifest resources from
//! it: cache-first for assets, online-first for the entry document.
//!
//! A [`Worker`] moves through `Uninitialized -> Installing -> Installed ->
//! Activating -> Activated`. Install stages the core resources, activation
//! reconciles the cached content against the manifest persisted by the
//! previous activation. The reconciliation decision itself is the pure
//! function [`plan_activation`].

pub mod error;
pub mod event;
pub mod fetcher;
pub mod key;
pub mod manifest;
pub mod plan;
pub mod state;
pub mod worker;

pub use error::{ReconcilerError, Result};
pub use event::{ControlMessage, Dispatched, FetchOutcome, FetchRequest, LifecycleEvent, ResponseSource};
pub use fetcher::{FetchMode, HttpFetcher, ResourceFetcher};
pub use key::{entry_url, resource_key, ROOT_KEY};
pub use manifest::Manifest;
pub use plan::{plan_activation, ActivationPlan};
pub use state::WorkerState;
pub use worker::{CacheNames, Worker, WorkerConfig, DEFAULT_CORE_RESOURCES, MANIFEST_KEY};
