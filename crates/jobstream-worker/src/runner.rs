//! Failure-isolated execution of blocking jobs.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use jobstream_core::{JobConfig, JobFailure, JobId, JobResult};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::job::{JobError, JobExecutor, ResourceLoader};
use crate::sink::{ClosableSink, EventSink, NullSink};

/// Runs jobs off the async runtime and turns every outcome into a
/// [`JobResult`].
#[derive(Clone)]
pub struct WorkerRunner {
    executor: Arc<dyn JobExecutor>,
    loader: Option<Arc<dyn ResourceLoader>>,
}

impl WorkerRunner {
    /// Create a runner for the given executor.
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            executor,
            loader: None,
        }
    }

    /// Builder method to load resources before each job.
    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Run a job to completion on the calling thread.
    ///
    /// Errors and panics raised by the loader or the executor become
    /// [`JobResult::Failure`] and are logged with their full trace. Whatever
    /// happens, `sink` is closed exactly once as the very last step, so the
    /// consumer always sees end of stream.
    pub fn run<S: ClosableSink>(&self, job_id: &JobId, config: &JobConfig, sink: Option<S>) -> JobResult {
        info!(job_id = %job_id, streaming = sink.is_some(), "Starting job");
        let start = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.execute(config, sink.as_ref().map(|s| s as &dyn EventSink))
        }));

        let result = match outcome {
            Ok(Ok(())) => JobResult::Success,
            Ok(Err(err)) => JobResult::Failure(failure_from_error(&err)),
            Err(payload) => JobResult::Failure(failure_from_panic(payload.as_ref())),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            JobResult::Success => {
                info!(job_id = %job_id, elapsed_ms, "Job completed");
            }
            JobResult::Failure(failure) => {
                error!(
                    job_id = %job_id,
                    elapsed_ms,
                    error = %failure.message,
                    trace = %failure.trace,
                    "Job failed"
                );
            }
        }

        if let Some(sink) = sink {
            sink.close();
        }
        result
    }

    /// Run a job on tokio's blocking thread pool.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle detaches the job; it still runs to completion.
    pub fn spawn<S>(&self, job_id: JobId, config: JobConfig, sink: Option<S>) -> WorkerHandle
    where
        S: ClosableSink + 'static,
    {
        let runner = self.clone();
        let handle_id = job_id.clone();
        let join = tokio::task::spawn_blocking(move || runner.run(&job_id, &config, sink));
        WorkerHandle {
            job_id: handle_id,
            join,
        }
    }

    /// Run a job with no event sink on the blocking thread pool and wait for
    /// its result.
    pub async fn run_to_completion(&self, job_id: JobId, config: JobConfig) -> JobResult {
        self.spawn::<NullSink>(job_id, config, None).join().await
    }

    fn execute(&self, config: &JobConfig, sink: Option<&dyn EventSink>) -> Result<(), JobError> {
        let resource = match &self.loader {
            Some(loader) => Some(loader.load(config)?),
            None => None,
        };
        self.executor.execute(config, resource.as_ref(), sink)
    }
}

/// Handle to a job running on the blocking pool.
pub struct WorkerHandle {
    job_id: JobId,
    join: JoinHandle<JobResult>,
}

impl WorkerHandle {
    /// The job this handle belongs to.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Returns true once the worker thread has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the job's result.
    pub async fn join(self) -> JobResult {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Worker thread did not complete");
                JobResult::Failure(JobFailure::new(
                    "worker thread did not complete",
                    e.to_string(),
                ))
            }
        }
    }
}

fn failure_from_error(err: &JobError) -> JobFailure {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(trace, "\ncaused by: {}", cause);
        source = cause.source();
    }
    append_backtrace(&mut trace);
    JobFailure::new(err.to_string(), trace)
}

fn failure_from_panic(payload: &(dyn Any + Send)) -> JobFailure {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<unknown>".to_string()
    };

    let mut trace = format!("panic: {}", msg);
    append_backtrace(&mut trace);
    JobFailure::new(format!("job panicked: {}", msg), trace)
}

fn append_backtrace(trace: &mut String) {
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        let _ = write!(trace, "\n{}", backtrace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ResourceHandle;
    use crate::queue::{handoff_queue, QueueItem};
    use crate::simulated::ScriptedJob;
    use crate::sink::QueueBackedSink;
    use jobstream_core::JobEvent;
    use serde_json::{json, Map, Value};

    fn empty_config() -> JobConfig {
        JobConfig::new(Map::new())
    }

    async fn drain(consumer: &mut crate::queue::QueueConsumer) -> Vec<QueueItem> {
        let mut items = Vec::new();
        loop {
            let item = consumer.pull().await;
            let done = item.is_end_of_stream();
            items.push(item);
            if done {
                return items;
            }
        }
    }

    struct FailingLoader;

    impl ResourceLoader for FailingLoader {
        fn load(&self, _config: &JobConfig) -> Result<ResourceHandle, JobError> {
            Err(JobError::Resource("dataset missing".to_string()))
        }
    }

    #[tokio::test]
    async fn test_success_ends_with_single_sentinel() {
        let job = ScriptedJob::new(vec![json!({ "step": 1 }), json!({ "step": 2 })]);
        let runner = WorkerRunner::new(Arc::new(job));
        let (producer, mut consumer) = handoff_queue();

        let handle = runner.spawn(
            JobId::generate(),
            empty_config(),
            Some(QueueBackedSink::new(producer)),
        );
        let items = drain(&mut consumer).await;
        let result = handle.join().await;

        assert!(result.is_success());
        assert_eq!(
            items,
            vec![
                QueueItem::Event(JobEvent::progress(json!({ "step": 1 }))),
                QueueItem::Event(JobEvent::progress(json!({ "step": 2 }))),
                QueueItem::EndOfStream,
            ]
        );
    }

    #[tokio::test]
    async fn test_error_still_pushes_sentinel() {
        let job = ScriptedJob::new(vec![json!({ "step": 1 }), json!({ "step": 2 })])
            .failing_after(1, "out of memory");
        let runner = WorkerRunner::new(Arc::new(job));
        let (producer, mut consumer) = handoff_queue();

        let handle = runner.spawn(
            JobId::generate(),
            empty_config(),
            Some(QueueBackedSink::new(producer)),
        );
        let items = drain(&mut consumer).await;
        let result = handle.join().await;

        assert_eq!(items.len(), 2);
        assert!(items[1].is_end_of_stream());
        let failure = result.failure().unwrap();
        assert!(failure.message.contains("out of memory"));
        assert!(failure.trace.contains("out of memory"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let job = ScriptedJob::new(vec![json!("a")]).panicking_after(1);
        let runner = WorkerRunner::new(Arc::new(job));
        let (producer, mut consumer) = handoff_queue();

        let handle = runner.spawn(
            JobId::generate(),
            empty_config(),
            Some(QueueBackedSink::new(producer)),
        );
        let items = drain(&mut consumer).await;
        let result = handle.join().await;

        assert_eq!(items.last(), Some(&QueueItem::EndOfStream));
        assert_eq!(
            items.iter().filter(|i| i.is_end_of_stream()).count(),
            1
        );
        assert!(result.failure().unwrap().message.starts_with("job panicked"));
    }

    #[tokio::test]
    async fn test_loader_failure_reported() {
        let job = ScriptedJob::new(vec![json!(1)]);
        let runner = WorkerRunner::new(Arc::new(job)).with_loader(Arc::new(FailingLoader));
        let (producer, mut consumer) = handoff_queue();

        let handle = runner.spawn(
            JobId::generate(),
            empty_config(),
            Some(QueueBackedSink::new(producer)),
        );
        let items = drain(&mut consumer).await;
        let result = handle.join().await;

        // Nothing was emitted, only the sentinel.
        assert_eq!(items, vec![QueueItem::EndOfStream]);
        assert!(result.failure().unwrap().message.contains("dataset missing"));
    }

    #[tokio::test]
    async fn test_run_to_completion_without_sink() {
        let job = ScriptedJob::new(vec![Value::Null, Value::Null]);
        let runner = WorkerRunner::new(Arc::new(job));
        let result = runner
            .run_to_completion(JobId::generate(), empty_config())
            .await;
        assert!(result.is_success());
    }
}
