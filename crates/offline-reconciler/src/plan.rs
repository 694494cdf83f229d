//! Activation planning
//!
//! Decides which cached entries survive an upgrade. Kept free of any I/O so
//! it can be tested without a cache store.

use crate::manifest::Manifest;

/// Cache mutations to perform when activating a new manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationPlan {
    /// Discard the whole content partition before promoting (cold start)
    pub reset_content: bool,
    /// Content keys to delete
    pub evict: Vec<String>,
    /// Content keys left untouched
    pub retain: Vec<String>,
    /// Staged keys to copy into content, overwriting retained entries
    pub promote: Vec<String>,
}

impl ActivationPlan {
    pub fn is_cold_start(&self) -> bool {
        self.reset_content
    }
}

/// Plan the reconciliation of `content_keys` against `current`.
///
/// Without a previous manifest nothing in the content partition can be
/// trusted, so it is reset. Otherwise an entry is kept only if the current
/// manifest lists it with the checksum the previous manifest recorded.
pub fn plan_activation(
    previous: Option<&Manifest>,
    current: &Manifest,
    content_keys: &[String],
    staged_keys: &[String],
) -> ActivationPlan {
    let promote = staged_keys.to_vec();

    let Some(previous) = previous else {
        return ActivationPlan {
            reset_content: true,
            evict: Vec::new(),
            retain: Vec::new(),
            promote,
        };
    };

    let (retain, evict): (Vec<String>, Vec<String>) = content_keys
        .iter()
        .cloned()
        .partition(|key| current.unchanged_since(previous, key));

    ActivationPlan {
        reset_content: false,
        evict,
        retain,
        promote,
    }
}
