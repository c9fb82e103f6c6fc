//! Core domain errors.

use thiserror::Error;

/// Core domain errors for jobstream.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The job payload is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A required job parameter is absent, null or empty.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Returns true if this error means the client sent a bad job request.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::MissingField(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
