//! jobstream Worker
//!
//! Runs a blocking job on a dedicated thread and bridges the events it
//! produces back into async code:
//!
//! - [`queue`]: the handoff queue between the blocking producer and the
//!   async consumer, with an explicit end-of-stream sentinel
//! - [`sink`]: the [`EventSink`] abstraction jobs write progress to
//! - [`runner`]: failure-isolated execution via `spawn_blocking`
//! - [`job`]: collaborator traits for the computation and its resources
//! - [`simulated`]: deterministic jobs for demos and tests

pub mod job;
pub mod queue;
pub mod runner;
pub mod simulated;
pub mod sink;

pub use job::{JobError, JobExecutor, ResourceHandle, ResourceLoader};
pub use queue::{bounded_handoff_queue, handoff_queue, QueueClosed, QueueConsumer, QueueItem, QueueProducer};
pub use runner::{WorkerHandle, WorkerRunner};
pub use simulated::{ScriptedJob, SimulatedDatasetLoader, SimulatedTrainer};
pub use sink::{ClosableSink, EventSink, NullSink, QueueBackedSink};
