//! # Folder Sync Pipeline
//!
//! Keeps one local folder in agreement with a remote metadata service and
//! object store.
//!
//! ## Overview
//!
//! ```text
//! FolderWatcher -> EventProducer -> EventFilter -> EventQueue -> EventConsumer -> ItemRequest
//!                        ^
//!        initial_diff_check (seeded once at startup)
//! ```
//!
//! The producer side never performs remote I/O; all network work happens on
//! the single consumer task, which processes events strictly in queue order.
//!
//! ## Components
//!
//! - **Change Event** (`event`): item-level change with relative paths
//! - **Ignore Rules** (`ignore`): control directory, staging files, configured globs
//! - **Event Filter** (`filter`): drops noise before it reaches the queue
//! - **Event Queue** (`queue`): FIFO channel with drain-on-stop
//! - **Event Producer** (`producer`): filter + enqueue, live or seeded
//! - **Event Consumer** (`consumer`): worker task with retry policy
//! - **Item Request** (`item_request`): upload, download, rename, remove, local remove
//! - **Initial Diff Check** (`diff_check`): startup reconciliation
//! - **Folder Watcher** (`watcher`): `notify` adapter feeding the producer

pub mod consumer;
pub mod diff_check;
pub mod error;
pub mod event;
pub mod filter;
pub mod fingerprint;
pub mod ignore;
pub mod item_request;
pub mod producer;
pub mod queue;
pub mod retry;
pub mod watcher;

pub use consumer::{ConsumerHandle, ConsumerStats, EventConsumer};
pub use diff_check::{
    apply_repairs, build_local_snapshot, build_remote_snapshot, compute, initial_diff_check,
    ItemState, LocalEntry, LocalRecordRepair, LocalSnapshot, RemoteSnapshot, ServerDiffList,
};
pub use error::{Result, SyncError};
pub use event::{ChangeEvent, ChangeKind, EventId, EventOrigin, QueuedEvent, RelativePath};
pub use filter::{DropReason, EventFilter, Verdict};
pub use fingerprint::{digest_file, fingerprint, FileDigest};
pub use ignore::IgnoreRules;
pub use item_request::{ItemRequest, Outcome};
pub use producer::{Admission, EventProducer, EventSource, ProducerStats};
pub use queue::{EventQueue, QueueReceiver, QueueSender, StopHandle};
pub use retry::RetryPolicy;
pub use watcher::{map_event, FolderWatcher};
