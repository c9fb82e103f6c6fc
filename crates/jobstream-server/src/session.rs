//! One client connection, one job.
//!
//! A [`StreamSession`] walks `Idle -> Accepting -> Running -> Draining ->
//! Closed`: it reads the job request, spawns the worker with a queue-backed
//! sink, relays every event to the client in order until end of stream, then
//! joins the worker and reports a failure as a single terminal error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jobstream_core::{JobEvent, JobId, JobResult, SessionId, SessionState};
use jobstream_worker::{ClosableSink, EventSink, QueueBackedSink, QueueConsumer, QueueItem};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::metrics::JobMode;
use crate::protocol::{ErrorCode, ServerMessage};
use crate::service::JobService;

/// The client connection failed or went away.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("Connection closed")]
    Closed,

    /// The underlying transport reported an error.
    #[error("Transport error: {0}")]
    Io(String),

    /// A message could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// A bidirectional client connection carrying JSON text messages.
///
/// `recv` must be cancel-safe: the relay loop races it against the handoff
/// queue.
#[async_trait]
pub trait ClientConnection: Send {
    /// Next inbound text message, or `Ok(None)` once the client has closed.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Send one message to the client.
    async fn send(&mut self, message: &ServerMessage) -> Result<(), TransportError>;

    /// Close the connection. Best effort.
    async fn close(&mut self);
}

/// What happened during a session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Session the report belongs to.
    pub session_id: SessionId,
    /// Set once a worker was started.
    pub job_id: Option<JobId>,
    /// State the session ended in; `Closed` unless something went wrong.
    pub final_state: SessionState,
    /// Worker result, when the session stayed connected long enough to see it.
    pub result: Option<JobResult>,
    /// Progress frames delivered to the client.
    pub events_forwarded: u64,
    /// The client went away (or a send failed) before end of stream.
    pub client_disconnected: bool,
}

impl SessionReport {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            job_id: None,
            final_state: SessionState::Idle,
            result: None,
            events_forwarded: 0,
            client_disconnected: false,
        }
    }
}

/// How the relay loop ended.
enum RelayEnd {
    EndOfStream,
    Disconnected,
}

/// Drives a single client connection through one job.
pub struct StreamSession<C> {
    id: SessionId,
    state: SessionState,
    conn: C,
    service: Arc<JobService>,
}

impl<C: ClientConnection> StreamSession<C> {
    /// Create a session for an established connection.
    pub fn new(conn: C, service: Arc<JobService>) -> Self {
        Self {
            id: SessionId::generate(),
            state: SessionState::Idle,
            conn,
            service,
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Run the session to completion.
    pub async fn run(mut self) -> SessionReport {
        let metrics = self.service.metrics_handle();
        let _active = metrics.session_opened();
        let mut report = SessionReport::new(self.id.clone());

        self.advance(SessionState::Accepting);
        let parsed = match self.conn.recv().await {
            Ok(Some(text)) => self.service.parse_request(&text).map_err(|e| e.to_string()),
            Ok(None) => {
                debug!(session_id = %self.id, "Client left before sending a job request");
                return self.finish(report);
            }
            Err(TransportError::Protocol(e)) => {
                Err(format!("job request could not be decoded: {}", e))
            }
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "Failed to read job request");
                return self.finish(report);
            }
        };

        let config = match parsed {
            Ok(config) => config,
            Err(message) => {
                warn!(session_id = %self.id, error = %message, "Rejected job request");
                metrics.record_rejected();
                let reply = ServerMessage::error(ErrorCode::InvalidRequest, message);
                if let Err(e) = self.conn.send(&reply).await {
                    debug!(session_id = %self.id, error = %e, "Could not deliver rejection");
                }
                self.conn.close().await;
                return self.finish(report);
            }
        };

        let job_id = JobId::generate();
        report.job_id = Some(job_id.clone());
        let (producer, mut consumer) = self.service.open_queue();
        let worker = self.service.runner().spawn(
            job_id.clone(),
            config,
            Some(QueueBackedSink::new(producer)),
        );
        self.advance(SessionState::Running);
        info!(session_id = %self.id, job_id = %job_id, "Job started");

        let end = self.relay(&mut consumer, &mut report).await;
        drop(consumer);

        if let RelayEnd::Disconnected = end {
            report.client_disconnected = true;
            debug!(
                session_id = %self.id,
                job_id = %job_id,
                events_forwarded = report.events_forwarded,
                "Client disconnected, job continues detached"
            );
            // Nobody is left to tell; the runner already logs failures.
            tokio::spawn(async move {
                let result = worker.join().await;
                metrics.record_job(JobMode::Stream, &result);
            });
            self.conn.close().await;
            return self.finish(report);
        }

        self.advance(SessionState::Draining);
        let result = worker.join().await;
        metrics.record_job(JobMode::Stream, &result);

        if let JobResult::Failure(failure) = &result {
            let reply = ServerMessage::error(ErrorCode::WorkerFailure, failure.message.as_str());
            if let Err(e) = self.conn.send(&reply).await {
                debug!(session_id = %self.id, error = %e, "Could not deliver job failure");
            }
        }
        self.conn.close().await;

        info!(
            session_id = %self.id,
            job_id = %job_id,
            outcome = result.outcome_label(),
            events_forwarded = report.events_forwarded,
            "Session finished"
        );
        report.result = Some(result);
        self.finish(report)
    }

    /// Forward queue items to the client until end of stream or disconnect.
    ///
    /// Inbound messages while a job is running are answered with a `busy`
    /// error, undecodable frames with `invalid_message`; the running job is
    /// not affected. Only a closed or failed connection stops the relay.
    async fn relay(&mut self, consumer: &mut QueueConsumer, report: &mut SessionReport) -> RelayEnd {
        loop {
            tokio::select! {
                biased;

                item = consumer.pull() => match item {
                    QueueItem::Event(event) => {
                        let message = ServerMessage::progress(event.into_payload());
                        if let Err(e) = self.conn.send(&message).await {
                            debug!(session_id = %self.id, error = %e, "Forward failed, stopping relay");
                            return RelayEnd::Disconnected;
                        }
                        report.events_forwarded += 1;
                    }
                    QueueItem::EndOfStream => return RelayEnd::EndOfStream,
                },

                inbound = self.conn.recv() => match inbound {
                    Ok(Some(_)) => {
                        debug!(session_id = %self.id, "Rejecting request while a job is running");
                        let reply = ServerMessage::error(
                            ErrorCode::Busy,
                            "a job is already running on this connection",
                        );
                        if self.conn.send(&reply).await.is_err() {
                            return RelayEnd::Disconnected;
                        }
                    }
                    Ok(None) => return RelayEnd::Disconnected,
                    Err(TransportError::Protocol(e)) => {
                        debug!(session_id = %self.id, error = %e, "Ignoring undecodable frame");
                        let reply = ServerMessage::error(ErrorCode::InvalidMessage, e);
                        if self.conn.send(&reply).await.is_err() {
                            return RelayEnd::Disconnected;
                        }
                    }
                    Err(e) => {
                        debug!(session_id = %self.id, error = %e, "Client connection failed");
                        return RelayEnd::Disconnected;
                    }
                },
            }
        }
    }

    fn advance(&mut self, to: SessionState) {
        if let Err(e) = self.state.transition(to) {
            warn!(session_id = %self.id, error = %e, "Unexpected session transition");
        }
    }

    fn finish(mut self, mut report: SessionReport) -> SessionReport {
        if !self.state.is_terminal() {
            self.advance(SessionState::Closed);
        }
        report.final_state = self.state;
        report
    }
}

/// Sink that writes each event straight into a live client connection.
///
/// The worker thread blocks on the network send for every event, so a slow
/// client slows the job down. Prefer [`QueueBackedSink`] with a
/// [`StreamSession`]; this exists for callers that hand the connection to the
/// job directly. Must only be used from a blocking thread, never from inside
/// an async task.
pub struct DirectConnectionSink<C> {
    conn: Arc<Mutex<C>>,
    handle: Handle,
    failed: AtomicBool,
}

impl<C: ClientConnection> DirectConnectionSink<C> {
    /// Create a sink writing to `conn` using the given runtime handle.
    pub fn new(conn: Arc<Mutex<C>>, handle: Handle) -> Self {
        Self {
            conn,
            handle,
            failed: AtomicBool::new(false),
        }
    }
}

impl<C: ClientConnection> EventSink for DirectConnectionSink<C> {
    fn emit(&self, event: JobEvent) {
        if self.failed.load(Ordering::Relaxed) {
            return;
        }
        let message = ServerMessage::progress(event.into_payload());
        let sent = self
            .handle
            .block_on(async { self.conn.lock().await.send(&message).await });
        if let Err(e) = sent {
            debug!(error = %e, "Direct send failed, dropping further events");
            self.failed.store(true, Ordering::Relaxed);
        }
    }
}

impl<C: ClientConnection> ClosableSink for DirectConnectionSink<C> {
    fn close(self) {
        // The connection belongs to the caller, which closes it.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ConfigSchema;
    use jobstream_worker::{ScriptedJob, WorkerRunner};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// In-memory connection: the test holds the other ends of two channels.
    struct TestConnection {
        inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
        outbound: mpsc::UnboundedSender<String>,
        /// Fail every send after this many successful ones.
        fail_after: Option<usize>,
        sent: usize,
    }

    struct TestClient {
        to_server: Option<mpsc::UnboundedSender<Result<String, TransportError>>>,
        from_server: mpsc::UnboundedReceiver<String>,
    }

    impl TestClient {
        fn submit(&self, payload: Value) {
            if let Some(tx) = &self.to_server {
                tx.send(Ok(payload.to_string())).unwrap();
            }
        }

        /// Deliver a frame the transport cannot decode.
        fn send_undecodable(&self) {
            if let Some(tx) = &self.to_server {
                tx.send(Err(TransportError::Protocol("invalid utf-8".into())))
                    .unwrap();
            }
        }

        fn hang_up(&mut self) {
            self.to_server = None;
        }

        async fn collect(&mut self) -> Vec<Value> {
            let mut received = Vec::new();
            while let Some(text) = self.from_server.recv().await {
                received.push(serde_json::from_str(&text).unwrap());
            }
            received
        }
    }

    fn connection(fail_after: Option<usize>) -> (TestConnection, TestClient) {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        (
            TestConnection {
                inbound,
                outbound,
                fail_after,
                sent: 0,
            },
            TestClient {
                to_server: Some(to_server),
                from_server,
            },
        )
    }

    #[async_trait]
    impl ClientConnection for TestConnection {
        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            self.inbound.recv().await.transpose()
        }

        async fn send(&mut self, message: &ServerMessage) -> Result<(), TransportError> {
            if self.fail_after.is_some_and(|n| self.sent >= n) {
                return Err(TransportError::Closed);
            }
            self.sent += 1;
            self.outbound
                .send(message.to_json()?)
                .map_err(|_| TransportError::Closed)
        }

        async fn close(&mut self) {
            // Dropping our sender is what the client observes as close;
            // replace it with a dangling one.
            let (tx, _rx) = mpsc::unbounded_channel();
            self.outbound = tx;
        }
    }

    fn service(job: ScriptedJob) -> Arc<JobService> {
        let runner = WorkerRunner::new(Arc::new(job));
        Arc::new(JobService::new(ConfigSchema::default().require("param"), runner))
    }

    fn steps(n: u64) -> Vec<Value> {
        (1..=n).map(|step| json!({ "step": step })).collect()
    }

    #[tokio::test]
    async fn test_streams_events_then_closes() {
        let svc = service(ScriptedJob::new(steps(2)));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));

        let report = StreamSession::new(conn, svc.clone()).run().await;
        let received = client.collect().await;

        assert_eq!(received, vec![json!({ "step": 1 }), json!({ "step": 2 })]);
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(report.events_forwarded, 2);
        assert!(report.result.unwrap().is_success());
        assert!(!report.client_disconnected);
        assert_eq!(svc.metrics().jobs_total(JobMode::Stream, true), 1);
        assert_eq!(svc.metrics().sessions_active(), 0);
    }

    #[tokio::test]
    async fn test_preserves_order_for_many_events() {
        let svc = service(ScriptedJob::new(steps(500)));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));

        StreamSession::new(conn, svc).run().await;
        assert_eq!(client.collect().await, steps(500));
    }

    #[tokio::test]
    async fn test_bounded_queue_delivers_everything() {
        let runner = WorkerRunner::new(Arc::new(ScriptedJob::new(steps(50))));
        let svc = Arc::new(
            JobService::new(ConfigSchema::default(), runner).with_queue_capacity(Some(2)),
        );
        let (conn, mut client) = connection(None);
        client.submit(json!({}));

        StreamSession::new(conn, svc).run().await;
        assert_eq!(client.collect().await, steps(50));
    }

    #[tokio::test]
    async fn test_failure_sends_terminal_error() {
        let svc = service(ScriptedJob::new(steps(2)).failing_after(1, "CUDA out of memory"));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));

        let report = StreamSession::new(conn, svc).run().await;
        let received = client.collect().await;

        assert_eq!(received.len(), 2);
        assert_eq!(received[0], json!({ "step": 1 }));
        assert_eq!(received[1]["error"]["code"], "worker_failure");
        assert!(received[1]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("CUDA out of memory"));
        assert!(!report.result.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_panicking_job_sends_terminal_error() {
        let svc = service(ScriptedJob::new(steps(1)).panicking_after(1));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));

        StreamSession::new(conn, svc).run().await;
        let received = client.collect().await;

        assert_eq!(received[0], json!({ "step": 1 }));
        assert_eq!(received[1]["error"]["code"], "worker_failure");
    }

    #[tokio::test]
    async fn test_invalid_request_never_starts_worker() {
        let svc = service(ScriptedJob::new(steps(2)));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "other": 1 }));

        let report = StreamSession::new(conn, svc.clone()).run().await;
        let received = client.collect().await;

        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["error"]["code"], "invalid_request");
        assert!(report.job_id.is_none());
        assert!(report.result.is_none());
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(svc.metrics().requests_rejected(), 1);
    }

    #[tokio::test]
    async fn test_client_leaves_before_request() {
        let svc = service(ScriptedJob::new(steps(2)));
        let (conn, mut client) = connection(None);
        client.hang_up();

        let report = StreamSession::new(conn, svc).run().await;
        assert!(report.job_id.is_none());
        assert_eq!(report.final_state, SessionState::Closed);
        assert!(client.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_forward_failure_detaches_worker() {
        let svc = service(ScriptedJob::new(steps(10)).with_delay(Duration::from_millis(5)));
        let (conn, mut client) = connection(Some(3));
        client.submit(json!({ "param": "x" }));

        let report = StreamSession::new(conn, svc.clone()).run().await;

        assert!(report.client_disconnected);
        assert_eq!(report.events_forwarded, 3);
        assert!(report.result.is_none());
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(client.collect().await, steps(3));

        // The job still runs to completion in the background.
        let metrics = svc.metrics_handle();
        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.jobs_total(JobMode::Stream, true) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("detached job should finish");
    }

    #[tokio::test]
    async fn test_client_hang_up_mid_stream() {
        let svc = service(ScriptedJob::new(steps(20)).with_delay(Duration::from_millis(20)));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));

        let session = tokio::spawn(StreamSession::new(conn, svc).run());
        tokio::time::sleep(Duration::from_millis(70)).await;
        client.hang_up();

        let report = session.await.unwrap();
        assert!(report.client_disconnected);
        assert!(report.events_forwarded < 20);
    }

    #[tokio::test]
    async fn test_second_request_is_rejected_while_running() {
        let svc = service(ScriptedJob::new(steps(3)).with_delay(Duration::from_millis(50)));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));
        client.submit(json!({ "param": "y" }));

        let report = StreamSession::new(conn, svc).run().await;
        let received = client.collect().await;

        let busy: Vec<&Value> = received
            .iter()
            .filter(|m| m["error"]["code"] == "busy")
            .collect();
        assert_eq!(busy.len(), 1);
        let progress: Vec<Value> = received
            .into_iter()
            .filter(|m| m.get("error").is_none())
            .collect();
        assert_eq!(progress, steps(3));
        assert!(report.result.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_undecodable_frame_does_not_stop_relay() {
        let svc = service(ScriptedJob::new(steps(5)).with_delay(Duration::from_millis(20)));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));
        client.send_undecodable();

        let report = StreamSession::new(conn, svc).run().await;
        let received = client.collect().await;

        let errors: Vec<&Value> = received.iter().filter(|m| m.get("error").is_some()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["error"]["code"], "invalid_message");
        let progress: Vec<Value> = received
            .iter()
            .filter(|m| m.get("error").is_none())
            .cloned()
            .collect();
        assert_eq!(progress, steps(5));
        assert!(!report.client_disconnected);
        assert_eq!(report.events_forwarded, 5);
        assert!(report.result.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_undecodable_request_is_rejected() {
        let svc = service(ScriptedJob::new(steps(2)));
        let (conn, mut client) = connection(None);
        client.send_undecodable();

        let report = StreamSession::new(conn, svc.clone()).run().await;
        let received = client.collect().await;

        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["error"]["code"], "invalid_request");
        assert!(report.job_id.is_none());
        assert_eq!(svc.metrics().requests_rejected(), 1);
    }

    #[tokio::test]
    async fn test_progress_with_error_key_is_not_a_failure() {
        let payload = json!({ "error": { "code": "worker_failure", "message": "eval loss" } });
        let svc = service(ScriptedJob::new(vec![payload.clone()]));
        let (conn, mut client) = connection(None);
        client.submit(json!({ "param": "x" }));

        let report = StreamSession::new(conn, svc).run().await;
        let received = client.collect().await;

        assert!(report.result.unwrap().is_success());
        assert_eq!(received, vec![json!({ "progress": payload })]);
        assert!(received.iter().all(|m| m.get("error").is_none()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_direct_connection_sink() {
        let runner = WorkerRunner::new(Arc::new(ScriptedJob::new(steps(3))));
        let (conn, mut client) = connection(None);
        let conn = Arc::new(Mutex::new(conn));
        let sink = DirectConnectionSink::new(conn.clone(), Handle::current());

        let result = runner
            .spawn(JobId::generate(), jobstream_core::JobConfig::new(Default::default()), Some(sink))
            .join()
            .await;
        assert!(result.is_success());

        conn.lock().await.close().await;
        drop(conn);
        assert_eq!(client.collect().await, steps(3));
    }
}
