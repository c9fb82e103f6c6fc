//! Collaborator traits for the blocking computation.
//!
//! The bridge treats the job as opaque: something that may load resources,
//! then runs for a long time on the calling thread, optionally reporting
//! progress through an [`EventSink`], and finally returns or fails.

use std::collections::HashMap;

use jobstream_core::JobConfig;
use thiserror::Error;

use crate::sink::EventSink;

/// Errors a job or its resource loader can raise.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job configuration: {0}")]
    Config(String),

    #[error("Failed to load resources: {0}")]
    Resource(String),

    #[error("Job execution failed: {0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the resources a job runs against (e.g. its datasets).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceHandle {
    /// Human-readable name.
    pub name: String,

    /// Sources the resource was assembled from.
    pub sources: Vec<String>,

    /// Loader-specific metadata.
    pub metadata: HashMap<String, String>,
}

impl ResourceHandle {
    /// Create a new ResourceHandle.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Builder method to add a source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Builder method to add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Loads the resources a job needs before it starts. Blocking.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, config: &JobConfig) -> Result<ResourceHandle, JobError>;
}

/// The blocking computation.
///
/// `sink` is `None` in request/acknowledge mode, where no incremental events
/// are delivered.
pub trait JobExecutor: Send + Sync {
    fn execute(
        &self,
        config: &JobConfig,
        resource: Option<&ResourceHandle>,
        sink: Option<&dyn EventSink>,
    ) -> Result<(), JobError>;
}
