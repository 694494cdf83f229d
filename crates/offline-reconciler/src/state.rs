//! Worker lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a worker instance.
///
/// `Uninitialized -> Installing -> Installed (waiting) -> Activating -> Activated`.
/// A failed activation drops back to `Uninitialized`, as does a failed install
/// unless the worker was already `Activated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Uninitialized,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    Activated,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
        }
    }

    pub fn can_install(&self) -> bool {
        matches!(
            self,
            WorkerState::Uninitialized | WorkerState::Installed | WorkerState::Activated
        )
    }

    pub fn can_activate(&self) -> bool {
        matches!(self, WorkerState::Installed)
    }

    /// Only an active worker controls clients and sees their requests
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, WorkerState::Installed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
