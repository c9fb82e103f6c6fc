//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jobstream_core::JobResult;

use crate::state::AppState;

/// How a job was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// WebSocket streaming session.
    Stream,
    /// Single request/acknowledge exchange.
    Ack,
}

/// Process-wide job counters.
#[derive(Debug, Default)]
pub struct JobMetrics {
    sessions_active: AtomicU64,
    stream_success: AtomicU64,
    stream_failure: AtomicU64,
    ack_success: AtomicU64,
    ack_failure: AtomicU64,
    requests_rejected: AtomicU64,
}

impl JobMetrics {
    /// Count a session as active until the returned guard is dropped.
    pub fn session_opened(self: &Arc<Self>) -> ActiveSessionGuard {
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
        ActiveSessionGuard {
            metrics: Arc::clone(self),
        }
    }

    /// Record the outcome of a finished job.
    pub fn record_job(&self, mode: JobMode, result: &JobResult) {
        let counter = match (mode, result.is_success()) {
            (JobMode::Stream, true) => &self.stream_success,
            (JobMode::Stream, false) => &self.stream_failure,
            (JobMode::Ack, true) => &self.ack_success,
            (JobMode::Ack, false) => &self.ack_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job request rejected by validation.
    pub fn record_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of sessions currently open.
    pub fn sessions_active(&self) -> u64 {
        self.sessions_active.load(Ordering::Relaxed)
    }

    /// Number of finished jobs for a mode and outcome.
    pub fn jobs_total(&self, mode: JobMode, success: bool) -> u64 {
        let counter = match (mode, success) {
            (JobMode::Stream, true) => &self.stream_success,
            (JobMode::Stream, false) => &self.stream_failure,
            (JobMode::Ack, true) => &self.ack_success,
            (JobMode::Ack, false) => &self.ack_failure,
        };
        counter.load(Ordering::Relaxed)
    }

    /// Number of rejected job requests.
    pub fn requests_rejected(&self) -> u64 {
        self.requests_rejected.load(Ordering::Relaxed)
    }
}

/// Decrements the active session gauge on drop.
pub struct ActiveSessionGuard {
    metrics: Arc<JobMetrics>,
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        self.metrics.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Collect all metrics from AppState and format as Prometheus text.
pub fn collect_metrics(state: &AppState) -> String {
    let metrics = state.metrics();
    let mut output = String::new();

    writeln!(
        output,
        "# HELP jobstream_sessions_active Number of open streaming sessions"
    )
    .ok();
    writeln!(output, "# TYPE jobstream_sessions_active gauge").ok();
    writeln!(
        output,
        "jobstream_sessions_active {}",
        metrics.sessions_active()
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP jobstream_jobs_total Finished jobs by submission mode and outcome"
    )
    .ok();
    writeln!(output, "# TYPE jobstream_jobs_total counter").ok();
    for (mode, mode_label) in [(JobMode::Stream, "stream"), (JobMode::Ack, "ack")] {
        for (success, outcome) in [(true, "success"), (false, "failure")] {
            writeln!(
                output,
                "jobstream_jobs_total{{mode=\"{mode_label}\",outcome=\"{outcome}\"}} {}",
                metrics.jobs_total(mode, success)
            )
            .ok();
        }
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP jobstream_requests_rejected_total Job requests rejected by validation"
    )
    .ok();
    writeln!(output, "# TYPE jobstream_requests_rejected_total counter").ok();
    writeln!(
        output,
        "jobstream_requests_rejected_total {}",
        metrics.requests_rejected()
    )
    .ok();

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ConfigSchema, JobService};
    use jobstream_core::JobFailure;
    use jobstream_worker::{ScriptedJob, WorkerRunner};

    fn state() -> Arc<AppState> {
        let runner = WorkerRunner::new(Arc::new(ScriptedJob::default()));
        AppState::new(JobService::new(ConfigSchema::default(), runner))
    }

    #[test]
    fn test_collect_metrics_empty_state() {
        let state = state();
        let output = collect_metrics(&state);

        assert!(output.contains("jobstream_sessions_active 0"));
        assert!(output.contains("jobstream_jobs_total{mode=\"stream\",outcome=\"success\"} 0"));
        assert!(output.contains("jobstream_requests_rejected_total 0"));
    }

    #[test]
    fn test_counters_and_session_guard() {
        let state = state();
        let metrics = state.service.metrics_handle();

        let guard = metrics.session_opened();
        metrics.record_job(JobMode::Ack, &JobResult::Success);
        metrics.record_job(
            JobMode::Stream,
            &JobResult::Failure(JobFailure::new("boom", "")),
        );
        metrics.record_rejected();

        let output = collect_metrics(&state);
        assert!(output.contains("jobstream_sessions_active 1"));
        assert!(output.contains("jobstream_jobs_total{mode=\"ack\",outcome=\"success\"} 1"));
        assert!(output.contains("jobstream_jobs_total{mode=\"stream\",outcome=\"failure\"} 1"));
        assert!(output.contains("jobstream_requests_rejected_total 1"));

        drop(guard);
        assert_eq!(metrics.sessions_active(), 0);
    }
}
