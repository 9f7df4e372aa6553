use serde::Serialize;
use std::fmt;

/// Navigation session lifecycle.
///
/// `Arrived` and `Cancelled` are transient: the session passes through them
/// and settles in `Idle` within the same transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingDestination,
    Calculating,
    Navigating,
    Rerouting,
    Arrived,
    Cancelled,
}

impl SessionState {
    /// A route request or guidance is live.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Calculating | SessionState::Navigating | SessionState::Rerouting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingDestination => "awaiting_destination",
            SessionState::Calculating => "calculating",
            SessionState::Navigating => "navigating",
            SessionState::Rerouting => "rerouting",
            SessionState::Arrived => "arrived",
            SessionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the most recent session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Arrived,
    Cancelled,
    Failed,
}
