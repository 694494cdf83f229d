//! Events delivered to a worker by its host runtime

use crate::state::WorkerState;
use asset_cache_store::StoredResponse;
use std::fmt;
use url::Url;

/// Control messages posted to the worker by a client page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate a waiting worker now. Clients reload to pick it up.
    SkipWaiting,
    /// Fetch every manifest resource missing from the content cache
    DownloadOffline,
}

impl ControlMessage {
    pub fn parse(message: &str) -> Option<Self> {
        match message {
            "skipWaiting" => Some(ControlMessage::SkipWaiting),
            "downloadOffline" => Some(ControlMessage::DownloadOffline),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMessage::SkipWaiting => "skipWaiting",
            ControlMessage::DownloadOffline => "downloadOffline",
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request issued by a controlled client
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Online-first request that fell back to the cache after a network failure
    CacheFallback,
}

/// Result of offering a request to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; the host performs a normal network request
    Passthrough,
    Respond {
        response: StoredResponse,
        source: ResponseSource,
    },
}

impl FetchOutcome {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough)
    }
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
    Message(ControlMessage),
}

/// What handling a [`LifecycleEvent`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    State(WorkerState),
    Fetch(FetchOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(
            ControlMessage::parse("skipWaiting"),
            Some(ControlMessage::SkipWaiting)
        );
        assert_eq!(
            ControlMessage::parse("downloadOffline"),
            Some(ControlMessage::DownloadOffline)
        );
        assert_eq!(ControlMessage::parse("SKIPWAITING"), None);
        assert_eq!(ControlMessage::parse(""), None);
    }

    #[test]
    fn test_only_exact_get_is_get() {
        let url = Url::parse("https://app.example.com/").unwrap();
        assert!(FetchRequest::get(url.clone()).is_get());
        assert!(!FetchRequest::new("POST", url.clone()).is_get());
        assert!(!FetchRequest::new("HEAD", url).is_get());
    }
}
