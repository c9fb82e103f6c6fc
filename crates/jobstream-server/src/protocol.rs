//! Messages the server sends to clients.
//!
//! Progress events go out as the bare payload the job produced. Errors are
//! wrapped in an `{"error": {...}}` object so clients can tell them apart:
//! a frame with a top-level `error` key is always a server error. Progress
//! objects that carry their own top-level `error` key are sent nested as
//! `{"progress": <payload>}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The job payload was malformed or incomplete. Terminal.
    InvalidRequest,
    /// A second job was submitted while one is running. Not terminal.
    Busy,
    /// An inbound frame could not be decoded while a job is running. Not terminal.
    InvalidMessage,
    /// The job failed after starting. Terminal.
    WorkerFailure,
}

/// Error details sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// A message from the server to a streaming client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// One progress payload, forwarded as-is.
    Progress(Value),
    /// An error notification.
    Error { error: ErrorBody },
}

impl ServerMessage {
    /// Wrap a job's progress payload for the wire.
    pub fn progress(payload: Value) -> Self {
        match payload {
            Value::Object(map) if map.contains_key("error") => {
                Self::Progress(json!({ "progress": Value::Object(map) }))
            }
            other => Self::Progress(other),
        }
    }

    /// Create an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
