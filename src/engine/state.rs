//! Run state of the job controller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single job the controller owns.
///
/// `Pausing` and `Stopping` mean the request has been accepted but the loop has not yet
/// reached the next item boundary where it is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Pausing,
    Paused,
    Stopping,
    Stopped,
    Completed,
}

impl RunState {
    /// The control loop is iterating over the queue.
    pub fn is_looping(self) -> bool {
        matches!(self, Self::Running | Self::Pausing | Self::Stopping)
    }

    /// A job exists that has neither finished nor been stopped.
    pub fn is_active(self) -> bool {
        self.is_looping() || self == Self::Paused
    }

    /// States from which `start` may begin a fresh run.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
