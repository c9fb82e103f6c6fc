//! Event sinks that jobs write progress to.

use std::sync::atomic::{AtomicU64, Ordering};

use jobstream_core::JobEvent;
use tracing::{debug, trace};

use crate::queue::{QueueItem, QueueProducer};

/// Write side a job uses to report progress without knowing the transport.
///
/// `emit` must return quickly and must never fail the job: if the client is
/// gone the event is dropped.
pub trait EventSink: Send + Sync {
    /// Deliver one event, or drop it if nobody is listening any more.
    fn emit(&self, event: JobEvent);
}

/// A sink that the runner finishes once the job is over.
///
/// Jobs only ever see `&dyn EventSink`, so closing stays with whoever owns the
/// sink. Taking `self` makes a second close impossible.
pub trait ClosableSink: EventSink {
    /// Signal that no further events will be emitted.
    fn close(self)
    where
        Self: Sized;
}

/// Sink that pushes events into a handoff queue.
pub struct QueueBackedSink {
    producer: QueueProducer,
    dropped: AtomicU64,
}

impl QueueBackedSink {
    /// Wrap the producer side of a handoff queue.
    pub fn new(producer: QueueProducer) -> Self {
        Self {
            producer,
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of events dropped because the consumer was gone.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for QueueBackedSink {
    fn emit(&self, event: JobEvent) {
        if self.producer.push(QueueItem::Event(event)).is_err()
            && self.dropped.fetch_add(1, Ordering::Relaxed) == 0
        {
            debug!("Event consumer is gone, dropping further events");
        }
    }
}

impl ClosableSink for QueueBackedSink {
    fn close(self) {
        let delivered = self.producer.push(QueueItem::EndOfStream).is_ok();
        trace!(
            delivered,
            dropped_events = self.dropped_events(),
            "End of stream pushed"
        );
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: JobEvent) {}
}

impl ClosableSink for NullSink {
    fn close(self) {}
}
