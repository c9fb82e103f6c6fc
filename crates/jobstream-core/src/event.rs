//! Progress events emitted while a job executes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event produced by a running job.
///
/// Events are opaque to the bridge: the payload is forwarded to the client
/// exactly as the job produced it. End of stream is not an event; it is
/// signalled separately by the handoff queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobEvent {
    /// Arbitrary structured progress data destined for the client.
    Progress(Value),
}

impl JobEvent {
    /// Create a Progress event.
    pub fn progress(payload: impl Into<Value>) -> Self {
        Self::Progress(payload.into())
    }

    /// Borrow the payload carried by this event.
    pub fn payload(&self) -> &Value {
        match self {
            Self::Progress(payload) => payload,
        }
    }

    /// Consume the event and return its payload.
    pub fn into_payload(self) -> Value {
        match self {
            Self::Progress(payload) => payload,
        }
    }
}
