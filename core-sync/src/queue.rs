//! Event queue
//!
//! FIFO channel between the producer and the consumer, built on tokio mpsc.
//! A bounded queue applies backpressure to the producer; capacity `0` selects
//! an unbounded queue.
//!
//! Stopping the queue rejects further pushes, but events already queued are
//! still delivered: [`QueueReceiver::pop`] drains them and then returns `None`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::event::{ChangeEvent, EventId, QueuedEvent};

struct Shared {
    stop: CancellationToken,
    len: AtomicUsize,
}

#[derive(Clone)]
enum Tx {
    Bounded(mpsc::Sender<QueuedEvent>),
    Unbounded(mpsc::UnboundedSender<QueuedEvent>),
}

enum Rx {
    Bounded(mpsc::Receiver<QueuedEvent>),
    Unbounded(mpsc::UnboundedReceiver<QueuedEvent>),
}

impl Rx {
    async fn recv(&mut self) -> Option<QueuedEvent> {
        match self {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }

    fn close(&mut self) {
        match self {
            Rx::Bounded(rx) => rx.close(),
            Rx::Unbounded(rx) => rx.close(),
        }
    }
}

/// Constructors for the producer/consumer channel pair
pub struct EventQueue;

impl EventQueue {
    /// Create a queue; `capacity == 0` means unbounded.
    pub fn new(capacity: usize) -> (QueueSender, QueueReceiver) {
        if capacity == 0 {
            Self::unbounded()
        } else {
            Self::bounded(capacity)
        }
    }

    pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self::pair(Tx::Bounded(tx), Rx::Bounded(rx))
    }

    pub fn unbounded() -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::pair(Tx::Unbounded(tx), Rx::Unbounded(rx))
    }

    fn pair(tx: Tx, rx: Rx) -> (QueueSender, QueueReceiver) {
        let shared = Arc::new(Shared {
            stop: CancellationToken::new(),
            len: AtomicUsize::new(0),
        });
        (
            QueueSender {
                tx,
                shared: shared.clone(),
            },
            QueueReceiver {
                rx,
                shared,
                closed: false,
            },
        )
    }
}

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct QueueSender {
    tx: Tx,
    shared: Arc<Shared>,
}

impl QueueSender {
    /// Append an event. Waits for space on a full bounded queue.
    pub async fn push(&self, event: ChangeEvent) -> Result<EventId> {
        if self.shared.stop.is_cancelled() {
            return Err(SyncError::QueueClosed);
        }

        let queued = QueuedEvent::new(event);
        let id = queued.id;

        self.shared.len.fetch_add(1, Ordering::SeqCst);
        let sent = match &self.tx {
            Tx::Bounded(tx) => {
                tokio::select! {
                    biased;
                    _ = self.shared.stop.cancelled() => false,
                    result = tx.send(queued) => result.is_ok(),
                }
            }
            Tx::Unbounded(tx) => tx.send(queued).is_ok(),
        };

        if !sent {
            self.shared.len.fetch_sub(1, Ordering::SeqCst);
            return Err(SyncError::QueueClosed);
        }

        Ok(id)
    }

    pub fn stop(&self) {
        self.shared.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    /// Events pushed but not yet popped
    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shared.stop.clone())
    }
}

/// Consumer side
pub struct QueueReceiver {
    rx: Rx,
    shared: Arc<Shared>,
    closed: bool,
}

impl QueueReceiver {
    /// Next event in FIFO order.
    ///
    /// Returns `None` once the queue is stopped and drained, or when every
    /// sender has been dropped and the queue is empty.
    pub async fn pop(&mut self) -> Option<QueuedEvent> {
        if !self.closed && !self.shared.stop.is_cancelled() {
            tokio::select! {
                biased;
                event = self.rx.recv() => return self.take(event),
                _ = self.shared.stop.cancelled() => {}
            }
        }

        if !self.closed {
            debug!(remaining = self.len(), "Queue stopped, draining");
            self.rx.close();
            self.closed = true;
        }

        let event = self.rx.recv().await;
        self.take(event)
    }

    fn take(&self, event: Option<QueuedEvent>) -> Option<QueuedEvent> {
        if event.is_some() {
            self.shared.len.fetch_sub(1, Ordering::SeqCst);
        }
        event
    }

    pub fn stop(&self) {
        self.shared.stop.cancel();
    }

    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.shared.stop.clone())
    }
}

/// Stops a queue from outside either endpoint
#[derive(Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}
