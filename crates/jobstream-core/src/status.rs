//! Streaming session lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// State of a streaming session.
///
/// `Idle -> Accepting -> Running -> Draining -> Closed`, with an early exit
/// to `Closed` from any state when the client leaves or the request is
/// rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Connection not yet established.
    #[default]
    Idle,
    /// Connected, waiting for the job request payload.
    Accepting,
    /// Worker started, relaying events.
    Running,
    /// End of stream seen, waiting for the worker result.
    Draining,
    /// Connection and queue released.
    Closed,
}

impl SessionState {
    /// Returns true if the session is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check whether `self -> to` is a legal edge.
    pub fn can_transition_to(&self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, to),
            (Idle, Accepting) | (Accepting, Running) | (Running, Draining) | (Draining, Closed)
        ) || (to == Closed && !self.is_terminal())
    }

    /// Move to `to`, rejecting illegal edges.
    pub fn transition(&mut self, to: SessionState) -> Result<(), CoreError> {
        if !self.can_transition_to(to) {
            return Err(CoreError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Accepting => "accepting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
