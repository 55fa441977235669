//! Adaptor lifecycle states and the actions that move between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state reported to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptorState {
    #[default]
    Stopped,
    Starting,
    Running,
    /// Overlay on a running relay; clearing it returns to `Running`
    Error,
}

impl fmt::Display for AdaptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Requested lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Stopped,
    Starting,
    Running,
    Error,
    ClearError,
}

impl AdaptorState {
    /// Applies an action and returns the resulting state.
    /// Every state may move to `Error`; `ClearError` always lands on `Running`.
    pub fn apply(self, action: LifecycleAction) -> AdaptorState {
        match action {
            LifecycleAction::Stopped => Self::Stopped,
            LifecycleAction::Starting => Self::Starting,
            LifecycleAction::Running => Self::Running,
            LifecycleAction::Error => Self::Error,
            LifecycleAction::ClearError => Self::Running,
        }
    }
}
