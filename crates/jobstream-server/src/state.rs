//! Shared application state.

use std::sync::Arc;

use crate::metrics::JobMetrics;
use crate::service::JobService;

/// Shared application state.
pub struct AppState {
    /// Job validation and execution.
    pub service: Arc<JobService>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(service: JobService) -> Arc<Self> {
        Arc::new(Self {
            service: Arc::new(service),
        })
    }

    /// Counters shared with every session.
    pub fn metrics(&self) -> &JobMetrics {
        self.service.metrics()
    }
}
