//! Terminal outcome of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Details of a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Short, client-safe summary.
    pub message: String,

    /// Full diagnostic trace for the operator log (error chain, backtrace,
    /// panic location).
    pub trace: String,

    /// When the failure was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl JobFailure {
    /// Create a new JobFailure stamped with the current time.
    pub fn new(message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Outcome of one job execution. Produced exactly once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobResult {
    /// The job completed without error.
    Success,
    /// The job raised or panicked.
    Failure(JobFailure),
}

impl JobResult {
    /// Returns true if the job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Get the failure details, if any.
    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            Self::Success => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Short label used in logs and metrics.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(_) => "failure",
        }
    }
}
