//! Remote Service Abstractions
//!
//! Contracts for the two remote collaborators of the sync pipeline:
//! - [`RemoteMetadataService`] - the metadata server that knows which items exist
//!   remotely and at which content fingerprint
//! - [`ObjectStore`] - the blob store holding item content, keyed by relative path
//!
//! Implementations report failures through [`BridgeError`](crate::error::BridgeError)
//! so callers can tell transient failures (retry) from not-found (already applied)
//! and permanent ones (give up).

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Server-side descriptor of a synchronized item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Forward-slash relative path, unique per remote namespace
    pub path: String,
    /// Hex content fingerprint
    pub fingerprint: String,
    /// Content size in bytes
    pub size: u64,
    /// Unix timestamp of the last registration
    pub modified_at: Option<i64>,
}

impl RemoteItem {
    pub fn new(path: impl Into<String>, fingerprint: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint.into(),
            size,
            modified_at: None,
        }
    }
}

/// Remote metadata service client
///
/// # Errors
///
/// - `rename_item` and `delete_item` return `BridgeError::NotFound` when the
///   source entry does not exist.
/// - Network failures surface as `BridgeError::Transient`.
#[async_trait]
pub trait RemoteMetadataService: Send + Sync {
    /// List every descriptor in the remote namespace
    async fn list_items(&self) -> Result<Vec<RemoteItem>>;

    /// Fetch a descriptor by path, `None` when absent
    async fn get_item(&self, path: &str) -> Result<Option<RemoteItem>>;

    /// Create or replace the descriptor for `item.path`
    async fn put_item(&self, item: &RemoteItem) -> Result<()>;

    /// Move a descriptor from `old_path` to `new_path`
    async fn rename_item(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Delete the descriptor at `path`
    async fn delete_item(&self, path: &str) -> Result<()>;
}

/// Remote object store client
///
/// `get_object` and `delete_object` return `BridgeError::NotFound` for
/// missing keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, replacing any existing object
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// Fetch the object stored under `key`
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Delete the object stored under `key`
    async fn delete_object(&self, key: &str) -> Result<()>;
}
