//! Handoff queue between a blocking producer and an async consumer.
//!
//! The producer side lives on the worker thread and never touches the async
//! runtime; the consumer side is polled from a tokio task and suspends
//! cooperatively while the queue is empty. Both sides are backed by
//! `tokio::sync::mpsc`, which is safe to use across that boundary.

use jobstream_core::JobEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// An item carried by the handoff queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    /// A progress event produced by the job.
    Event(JobEvent),
    /// No further items will follow.
    EndOfStream,
}

impl QueueItem {
    /// Returns true for the end-of-stream sentinel.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// The consumer side of the queue has been dropped.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Handoff queue closed")]
pub struct QueueClosed;

enum ProducerChannel {
    Unbounded(mpsc::UnboundedSender<QueueItem>),
    Bounded(mpsc::Sender<QueueItem>),
}

enum ConsumerChannel {
    Unbounded(mpsc::UnboundedReceiver<QueueItem>),
    Bounded(mpsc::Receiver<QueueItem>),
}

/// Write side of a handoff queue. Single producer: not `Clone`.
pub struct QueueProducer {
    channel: ProducerChannel,
}

impl QueueProducer {
    /// Push an item.
    ///
    /// The unbounded variant never blocks. The bounded variant blocks the
    /// calling thread until the consumer makes room, so it must be called
    /// from a blocking context, never from inside an async task.
    pub fn push(&self, item: QueueItem) -> Result<(), QueueClosed> {
        match &self.channel {
            ProducerChannel::Unbounded(tx) => tx.send(item).map_err(|_| QueueClosed),
            ProducerChannel::Bounded(tx) => tx.blocking_send(item).map_err(|_| QueueClosed),
        }
    }

    /// Returns true once the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        match &self.channel {
            ProducerChannel::Unbounded(tx) => tx.is_closed(),
            ProducerChannel::Bounded(tx) => tx.is_closed(),
        }
    }
}

/// Read side of a handoff queue.
pub struct QueueConsumer {
    channel: ConsumerChannel,
    finished: bool,
}

impl QueueConsumer {
    /// Wait for the next item.
    ///
    /// Yields [`QueueItem::EndOfStream`] exactly once per stream as far as the
    /// caller's loop is concerned: after the sentinel has been observed every
    /// further call returns it again immediately. If the producer goes away
    /// without pushing the sentinel, the consumer synthesizes one so a relay
    /// loop can never hang.
    pub async fn pull(&mut self) -> QueueItem {
        if self.finished {
            return QueueItem::EndOfStream;
        }

        let next = match &mut self.channel {
            ConsumerChannel::Unbounded(rx) => rx.recv().await,
            ConsumerChannel::Bounded(rx) => rx.recv().await,
        };

        match next {
            Some(QueueItem::EndOfStream) => {
                self.finished = true;
                QueueItem::EndOfStream
            }
            Some(item) => item,
            None => {
                warn!("Handoff queue producer dropped without end-of-stream");
                self.finished = true;
                QueueItem::EndOfStream
            }
        }
    }

    /// Returns true once the sentinel has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Create an unbounded handoff queue.
pub fn handoff_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueProducer {
            channel: ProducerChannel::Unbounded(tx),
        },
        QueueConsumer {
            channel: ConsumerChannel::Unbounded(rx),
            finished: false,
        },
    )
}

/// Create a bounded handoff queue holding at most `capacity` pending items.
///
/// A full queue blocks the producer rather than dropping events.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded_handoff_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueProducer {
            channel: ProducerChannel::Bounded(tx),
        },
        QueueConsumer {
            channel: ConsumerChannel::Bounded(rx),
            finished: false,
        },
    )
}
