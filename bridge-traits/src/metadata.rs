//! Local Metadata Store Abstraction
//!
//! The local metadata store is the single source of truth for "what has
//! already been synchronized". One [`LocalRecord`] exists per item whose
//! content is known to match the remote side.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::metadata::{LocalMetadataStore, LocalRecord};
//!
//! async fn mark_synced(store: &dyn LocalMetadataStore) -> Result<()> {
//!     let record = LocalRecord::new("docs/report.txt", "9f86d0...", 1024, 1_700_000_000);
//!     store.upsert_record(&record).await
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Last-known synchronized state of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Forward-slash relative path (unique key)
    pub path: String,
    /// Hex content fingerprint at the time of the last successful sync
    pub fingerprint: String,
    /// Content size in bytes
    pub size: u64,
    /// Unix timestamp of the last successful sync
    pub synced_at: i64,
}

impl LocalRecord {
    pub fn new(
        path: impl Into<String>,
        fingerprint: impl Into<String>,
        size: u64,
        synced_at: i64,
    ) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint.into(),
            size,
            synced_at,
        }
    }
}

/// Local metadata store client
#[async_trait]
pub trait LocalMetadataStore: Send + Sync {
    /// Fetch every record, ordered by path
    async fn all_records(&self) -> Result<Vec<LocalRecord>>;

    /// Fetch a single record, `None` when the path was never synced
    async fn get_record(&self, path: &str) -> Result<Option<LocalRecord>>;

    /// Insert or replace the record keyed by `record.path`
    async fn upsert_record(&self, record: &LocalRecord) -> Result<()>;

    /// Re-key a record from `old_path` to `new_path`
    ///
    /// Returns `Ok(false)` when no record existed at `old_path`.
    async fn rename_record(&self, old_path: &str, new_path: &str) -> Result<bool>;

    /// Delete a record, returning whether one existed
    async fn delete_record(&self, path: &str) -> Result<bool>;

    /// Verify the store is reachable
    async fn health_check(&self) -> Result<()> {
        self.all_records().await.map(|_| ())
    }
}
