//! Evaluator lifecycle state.

use std::fmt::{Display, Formatter};

/// Lifecycle status of an evaluator and its driver process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Driver spawned; handshake not yet observed.
    Starting,
    /// Handshake complete; requests may be issued.
    Running,
    /// Driver exited or was shut down. Terminal.
    Dead,
}

impl RunState {
    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Dead` is terminal; any state may move to `Dead`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Running) | (Self::Starting | Self::Running | Self::Dead, Self::Dead)
        )
    }

    /// Whether requests may be issued in this state.
    #[must_use]
    pub fn accepts_requests(self) -> bool {
        self == Self::Running
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Dead => "dead",
        };
        f.write_str(name)
    }
}
