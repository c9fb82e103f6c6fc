//! Deterministic jobs that stand in for a real training run.
//!
//! [`SimulatedTrainer`] is what the server binary executes out of the box;
//! [`ScriptedJob`] replays a fixed list of payloads and is handy wherever the
//! exact event sequence matters.

use std::thread;
use std::time::Duration;

use jobstream_core::{JobConfig, JobEvent};
use serde_json::{json, Value};
use tracing::debug;

use crate::job::{JobError, JobExecutor, ResourceHandle, ResourceLoader};
use crate::sink::EventSink;

/// A fake training loop: sleeps per step and reports a decreasing loss.
///
/// Reads from the job config:
/// - `steps`: number of steps (falls back to the trainer default)
/// - `step_delay_ms`: time spent per step (falls back to the trainer default)
/// - `fail_at_step`: optional step at which the run fails
#[derive(Debug, Clone)]
pub struct SimulatedTrainer {
    default_steps: u64,
    default_step_delay: Duration,
}

impl SimulatedTrainer {
    /// Create a trainer with the given defaults.
    pub fn new(default_steps: u64, default_step_delay: Duration) -> Self {
        Self {
            default_steps,
            default_step_delay,
        }
    }
}

impl Default for SimulatedTrainer {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

impl JobExecutor for SimulatedTrainer {
    fn execute(
        &self,
        config: &JobConfig,
        resource: Option<&ResourceHandle>,
        sink: Option<&dyn EventSink>,
    ) -> Result<(), JobError> {
        let steps = config.get_u64("steps").unwrap_or(self.default_steps);
        let delay = config
            .get_u64("step_delay_ms")
            .map(Duration::from_millis)
            .unwrap_or(self.default_step_delay);
        let fail_at = config.get_u64("fail_at_step");

        if let Some(step) = fail_at {
            if step == 0 || step > steps {
                return Err(JobError::Config(format!(
                    "fail_at_step must be within 1..={}, got {}",
                    steps, step
                )));
            }
        }

        debug!(
            steps,
            delay_ms = delay.as_millis() as u64,
            dataset = resource.map(|r| r.name.as_str()),
            "Simulated training started"
        );

        for step in 1..=steps {
            thread::sleep(delay);
            if fail_at == Some(step) {
                return Err(JobError::Execution(format!(
                    "simulated failure at step {}",
                    step
                )));
            }
            if let Some(sink) = sink {
                sink.emit(JobEvent::progress(json!({
                    "step": step,
                    "total_steps": steps,
                    "loss": 1.0 / (step as f64 + 1.0),
                })));
            }
        }
        Ok(())
    }
}

/// Resolves the optional `datasets` array of a job config.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedDatasetLoader;

impl ResourceLoader for SimulatedDatasetLoader {
    fn load(&self, config: &JobConfig) -> Result<ResourceHandle, JobError> {
        let name = config.get_str("base_model").unwrap_or("default");
        let mut handle = ResourceHandle::new(name);

        match config.get("datasets") {
            None | Some(Value::Null) => {}
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let path = entry.as_str().ok_or_else(|| {
                        JobError::Resource(format!("dataset entry is not a string: {}", entry))
                    })?;
                    handle = handle.with_source(path);
                }
            }
            Some(other) => {
                return Err(JobError::Resource(format!(
                    "datasets must be an array, got {}",
                    other
                )));
            }
        }

        let count = handle.sources.len().to_string();
        Ok(handle.with_metadata("dataset_count", count))
    }
}

/// Replays a fixed list of payloads, optionally failing part way.
#[derive(Debug, Clone, Default)]
pub struct ScriptedJob {
    payloads: Vec<Value>,
    delay: Duration,
    failure: Option<ScriptedFailure>,
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    after: usize,
    message: String,
    panic: bool,
}

impl ScriptedJob {
    /// Create a job that emits `payloads` in order and succeeds.
    pub fn new(payloads: Vec<Value>) -> Self {
        Self {
            payloads,
            delay: Duration::ZERO,
            failure: None,
        }
    }

    /// Builder method to sleep before every payload and before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Builder method to return an error once `after` payloads were emitted.
    pub fn failing_after(mut self, after: usize, message: impl Into<String>) -> Self {
        self.failure = Some(ScriptedFailure {
            after,
            message: message.into(),
            panic: false,
        });
        self
    }

    /// Builder method to panic once `after` payloads were emitted.
    pub fn panicking_after(mut self, after: usize) -> Self {
        self.failure = Some(ScriptedFailure {
            after,
            message: format!("scripted panic after {} events", after),
            panic: true,
        });
        self
    }

    fn check_failure(&self, emitted: usize) -> Result<(), JobError> {
        match &self.failure {
            Some(failure) if failure.after == emitted => {
                if failure.panic {
                    panic!("{}", failure.message);
                }
                Err(JobError::Execution(failure.message.clone()))
            }
            _ => Ok(()),
        }
    }
}

impl JobExecutor for ScriptedJob {
    fn execute(
        &self,
        _config: &JobConfig,
        _resource: Option<&ResourceHandle>,
        sink: Option<&dyn EventSink>,
    ) -> Result<(), JobError> {
        for (emitted, payload) in self.payloads.iter().enumerate() {
            self.check_failure(emitted)?;
            thread::sleep(self.delay);
            if let Some(sink) = sink {
                sink.emit(JobEvent::progress(payload.clone()));
            }
        }
        self.check_failure(self.payloads.len())?;
        thread::sleep(self.delay);
        Ok(())
    }
}
