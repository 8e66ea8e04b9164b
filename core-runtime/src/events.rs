//! # Event Bus System
//!
//! Provides an event-driven surface for the sync agent using `tokio::sync::broadcast`.
//! Pipeline stages publish typed outcomes here so that an operator-facing
//! component (the binary's status logger, a tray icon, a test) can observe
//! them without coupling to the pipeline internals.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wrapping per-domain enums
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐    emit     ┌───────────┐
//! │ EventConsumer ├────────────>│           │    subscribe    ┌────────────┐
//! └───────────────┘             │ EventBus  ├────────────────>│ Subscriber │
//! ┌───────────────┐    emit     │ (broadcast│                 └────────────┘
//! │ FolderWatcher ├────────────>│  channel) │
//! └───────────────┘             └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::ItemSynced {
//!         path: "docs/a.txt".to_string(),
//!         action: "upload".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Item synchronized");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing never blocks; with no subscribers `emit` returns an error that
//! publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Pipeline events (diff, consumer, item outcomes)
    Sync(SyncEvent),
    /// Folder watcher lifecycle
    Watcher(WatcherEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Watcher(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::ItemFailed { .. }) => EventSeverity::Error,
            CoreEvent::Watcher(WatcherEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::ItemRetrying { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::ConsumerStarted)
            | CoreEvent::Sync(SyncEvent::ConsumerStopped { .. })
            | CoreEvent::Sync(SyncEvent::DiffComputed { .. })
            | CoreEvent::Watcher(WatcherEvent::Started { .. })
            | CoreEvent::Watcher(WatcherEvent::Stopped) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Outcomes of the synchronization pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Startup reconciliation finished.
    DiffComputed {
        removals: usize,
        downloads: usize,
        uploads: usize,
        /// Local records rewritten without remote I/O.
        repairs: usize,
    },
    /// The consumer worker is draining the queue.
    ConsumerStarted,
    /// The consumer worker exited after draining.
    ConsumerStopped {
        processed: u64,
        failed: u64,
    },
    /// A reconciliation action committed.
    ItemSynced {
        /// Relative path of the item.
        path: String,
        /// Action name (`upload`, `download`, `rename`, `remove`).
        action: String,
    },
    /// A transient failure will be retried.
    ItemRetrying {
        path: String,
        action: String,
        /// Attempt that just failed (1-based).
        attempt: u32,
        delay_ms: u64,
        message: String,
    },
    /// The event was dropped; its effect is lost until the next change or restart.
    ItemFailed {
        path: String,
        action: String,
        attempts: u32,
        message: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::DiffComputed { .. } => "Initial diff computed",
            SyncEvent::ConsumerStarted => "Event consumer started",
            SyncEvent::ConsumerStopped { .. } => "Event consumer stopped",
            SyncEvent::ItemSynced { .. } => "Item synchronized",
            SyncEvent::ItemRetrying { .. } => "Retrying item after transient failure",
            SyncEvent::ItemFailed { .. } => "Item synchronization failed",
        }
    }
}

// ============================================================================
// Watcher Events
// ============================================================================

/// Folder watcher lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum WatcherEvent {
    Started { root: String },
    Stopped,
    /// The OS notification backend reported an error.
    Error { message: String },
}

impl WatcherEvent {
    fn description(&self) -> &str {
        match self {
            WatcherEvent::Started { .. } => "Folder watcher started",
            WatcherEvent::Stopped => "Folder watcher stopped",
            WatcherEvent::Error { .. } => "Folder watcher error",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers falling behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let failures = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Error);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(path: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::ItemSynced {
            path: path.to_string(),
            action: "upload".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(synced("a.txt")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::ConsumerStarted);
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Error);

        bus.emit(synced("a.txt")).ok();

        let failure = CoreEvent::Sync(SyncEvent::ItemFailed {
            path: "b.txt".to_string(),
            action: "upload".to_string(),
            attempts: 1,
            message: "Unauthorized".to_string(),
        });
        bus.emit(failure.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), failure);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(synced(&format!("{}.txt", i))).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let retrying = CoreEvent::Sync(SyncEvent::ItemRetrying {
            path: "a.txt".to_string(),
            action: "download".to_string(),
            attempt: 1,
            delay_ms: 200,
            message: "timeout".to_string(),
        });
        assert_eq!(retrying.severity(), EventSeverity::Warning);
        assert_eq!(synced("a.txt").severity(), EventSeverity::Debug);
        assert_eq!(
            CoreEvent::Watcher(WatcherEvent::Stopped).severity(),
            EventSeverity::Info
        );
        assert_eq!(
            CoreEvent::Watcher(WatcherEvent::Error {
                message: "inotify limit".to_string()
            })
            .severity(),
            EventSeverity::Error
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Sync(SyncEvent::DiffComputed {
            removals: 1,
            downloads: 2,
            uploads: 3,
            repairs: 0,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Sync\""));
        assert!(json.contains("\"event\":\"DiffComputed\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
