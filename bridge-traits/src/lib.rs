//! # Host Bridge Traits
//!
//! Collaborator contracts for the folder sync agent.
//!
//! ## Overview
//!
//! The sync pipeline never talks to a disk, a database or a server directly.
//! Every external capability it depends on is expressed as a trait here and
//! implemented by an adapter crate (`bridge-desktop` for the shipped agent,
//! in-memory fakes for tests).
//!
//! ## Traits
//!
//! ### Local side
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O under the watched folder
//! - [`LocalMetadataStore`](metadata::LocalMetadataStore) - Last-synced record per item
//!
//! ### Remote side
//! - [`RemoteMetadataService`](remote::RemoteMetadataService) - Item descriptors on the metadata server
//! - [`ObjectStore`](remote::ObjectStore) - Blob content keyed by relative path
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Callers decide
//! whether to retry through [`BridgeError::classify`], so adapters must map
//! their native failures onto the right variant:
//!
//! - network hiccups, 5xx and 429 responses to `Transient`
//! - absent targets to `NotFound`
//! - everything else to a permanent variant
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! behind an `Arc` by the producer, the consumer and the watcher tasks.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::remote::{ObjectStore, RemoteItem, RemoteMetadataService};
//! use bridge_traits::error::Result;
//!
//! async fn publish(
//!     meta: &dyn RemoteMetadataService,
//!     blobs: &dyn ObjectStore,
//!     item: RemoteItem,
//!     content: bytes::Bytes,
//! ) -> Result<()> {
//!     blobs.put_object(&item.path, content).await?;
//!     meta.put_item(&item).await
//! }
//! ```

pub mod error;
pub mod metadata;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::{BridgeError, FailureClass};

// Re-export commonly used types
pub use metadata::{LocalMetadataStore, LocalRecord};
pub use remote::{ObjectStore, RemoteItem, RemoteMetadataService};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
