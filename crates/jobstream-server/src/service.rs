//! Boundary between inbound requests and the worker.
//!
//! `JobService` turns raw payloads into a validated [`JobConfig`] and owns
//! everything a session or handler needs to start a job.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use jobstream_core::{CoreError, JobConfig, JobFailure, JobId, JobResult};
use jobstream_worker::{
    bounded_handoff_queue, handoff_queue, QueueConsumer, QueueProducer, WorkerRunner,
};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::{JobMetrics, JobMode};

/// Which job parameters are required and which get default values.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    required: Vec<String>,
    defaults: Map<String, Value>,
}

impl ConfigSchema {
    /// Builder method to require a parameter.
    pub fn require(mut self, key: impl Into<String>) -> Self {
        self.required.push(key.into());
        self
    }

    /// Builder method to give a parameter a default value.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Parameters every request must carry.
    pub fn required(&self) -> &[String] {
        &self.required
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
        }
    }
}

/// Acknowledgement returned once a job run in request/acknowledge mode
/// has succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgement {
    pub job_id: JobId,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Errors from request/acknowledge mode.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The payload failed validation; no worker was started.
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    /// The job started and failed.
    #[error("Job {} failed: {}", .job_id, .failure.message)]
    WorkerFailure { job_id: JobId, failure: JobFailure },
}

/// Validates job requests and starts jobs.
pub struct JobService {
    schema: ConfigSchema,
    runner: WorkerRunner,
    queue_capacity: Option<usize>,
    metrics: Arc<JobMetrics>,
}

impl JobService {
    /// Create a service with unbounded handoff queues.
    pub fn new(schema: ConfigSchema, runner: WorkerRunner) -> Self {
        Self {
            schema,
            runner,
            queue_capacity: None,
            metrics: Arc::new(JobMetrics::default()),
        }
    }

    /// Builder method to bound every session's handoff queue.
    ///
    /// `None` or `Some(0)` keeps queues unbounded.
    pub fn with_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity.filter(|c| *c > 0);
        self
    }

    /// Validate a raw payload and apply defaults.
    ///
    /// The payload must be a JSON object. Required parameters must be present,
    /// non-null and, for strings, non-blank. Absent or null parameters with a
    /// default get the default. No I/O happens here.
    pub fn build_config(&self, raw: Value) -> Result<JobConfig, CoreError> {
        let mut params = match raw {
            Value::Object(params) => params,
            other => {
                return Err(CoreError::InvalidRequest(format!(
                    "job payload must be a JSON object, got {}",
                    json_kind(&other)
                )));
            }
        };

        for key in &self.schema.required {
            match params.get(key) {
                None | Some(Value::Null) => return Err(CoreError::MissingField(key.clone())),
                Some(Value::String(s)) if s.trim().is_empty() => {
                    return Err(CoreError::MissingField(key.clone()));
                }
                Some(_) => {}
            }
        }

        for (key, default) in &self.schema.defaults {
            if matches!(params.get(key), None | Some(Value::Null)) {
                params.insert(key.clone(), default.clone());
            }
        }

        Ok(JobConfig::new(params))
    }

    /// Parse a JSON text payload, then validate it.
    pub fn parse_request(&self, text: &str) -> Result<JobConfig, CoreError> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::InvalidRequest(format!("payload is not valid JSON: {}", e)))?;
        self.build_config(raw)
    }

    /// Liveness probe. No side effects.
    pub fn health_check(&self) -> HealthStatus {
        HealthStatus::Ok
    }

    /// Create a fresh handoff queue for one session.
    pub fn open_queue(&self) -> (QueueProducer, QueueConsumer) {
        match self.queue_capacity {
            Some(capacity) => bounded_handoff_queue(capacity),
            None => handoff_queue(),
        }
    }

    /// The runner jobs are started on.
    pub fn runner(&self) -> &WorkerRunner {
        &self.runner
    }

    /// Job counters.
    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    /// Shared handle to the job counters.
    pub fn metrics_handle(&self) -> Arc<JobMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Request/acknowledge mode: validate, run the job to completion with no
    /// event sink, and return a single acknowledgement.
    ///
    /// The job runs on the blocking thread pool, so the calling task only
    /// awaits it; a long job never occupies an async worker thread.
    pub async fn run_acknowledged(&self, raw: Value) -> Result<Acknowledgement, ServiceError> {
        let config = match self.build_config(raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Rejected job request");
                self.metrics.record_rejected();
                return Err(e.into());
            }
        };

        let job_id = JobId::generate();
        info!(job_id = %job_id, "Running job in acknowledge mode");
        let start = Instant::now();

        let result = self.runner.run_to_completion(job_id.clone(), config).await;
        self.metrics.record_job(JobMode::Ack, &result);

        match result {
            JobResult::Success => Ok(Acknowledgement {
                job_id,
                elapsed_ms: start.elapsed().as_millis() as u64,
                completed_at: Utc::now(),
            }),
            JobResult::Failure(failure) => Err(ServiceError::WorkerFailure { job_id, failure }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
