//! Item requests
//!
//! The five actions the consumer performs against the remote side and the
//! local store. Every action is idempotent: replaying one that already took
//! effect returns [`Outcome::Unchanged`] instead of duplicating work, so the
//! consumer can retry freely after a partial failure.
//!
//! Objects are keyed by the item's relative path. Write order keeps the
//! remote consistent if a step fails midway:
//!
//! - upload: object, then descriptor, then local record
//! - rename: copy object, rename descriptor, delete old object, then local record
//! - remove: descriptor, then object
//! - download: object to disk, then local record

use bridge_traits::{
    error::BridgeError,
    metadata::{LocalMetadataStore, LocalRecord},
    remote::{ObjectStore, RemoteItem, RemoteMetadataService},
    storage::FileSystemAccess,
    time::Clock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{Result, SyncError};
use crate::event::RelativePath;
use crate::fingerprint::{digest_file, fingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Already in the target state
    Unchanged,
}

pub struct ItemRequest {
    root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    remote: Arc<dyn RemoteMetadataService>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn LocalMetadataStore>,
    clock: Arc<dyn Clock>,
}

impl ItemRequest {
    pub fn new(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemAccess>,
        remote: Arc<dyn RemoteMetadataService>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn LocalMetadataStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root: root.into(),
            fs,
            remote,
            objects,
            store,
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystemAccess> {
        &self.fs
    }

    pub fn store(&self) -> &Arc<dyn LocalMetadataStore> {
        &self.store
    }

    /// Push the file's current content to the remote side.
    ///
    /// A file that vanished before upload is not an error. When the local
    /// record and the remote descriptor both match the file, nothing is sent.
    #[instrument(skip(self, path), fields(path = %path))]
    pub async fn upload(&self, path: &RelativePath) -> Result<Outcome> {
        let absolute = path.to_absolute(&self.root);
        let Some(data) = self.read_local(path, &absolute).await? else {
            debug!("File gone before upload");
            return Ok(Outcome::Unchanged);
        };
        let digest = fingerprint(&data);
        let size = data.len() as u64;

        if self.is_recorded(path, &digest).await? && self.remote_matches(path, &digest).await? {
            debug!("Already uploaded");
            return Ok(Outcome::Unchanged);
        }

        self.objects
            .put_object(path.as_str(), data)
            .await
            .map_err(|e| SyncError::action("upload", path.as_str(), e))?;

        let mut item = RemoteItem::new(path.as_str(), digest.clone(), size);
        item.modified_at = Some(self.clock.unix_timestamp());
        self.remote
            .put_item(&item)
            .await
            .map_err(|e| SyncError::action("upload", path.as_str(), e))?;

        self.record(path, digest, size).await?;
        info!(size, "Uploaded item");
        Ok(Outcome::Applied)
    }

    /// Fetch a remote item into the watched folder.
    ///
    /// A local file with different content is left alone; the watcher will
    /// report it and it will be uploaded instead.
    #[instrument(skip(self, path), fields(path = %path))]
    pub async fn download(&self, path: &RelativePath) -> Result<Outcome> {
        let Some(item) = self
            .remote
            .get_item(path.as_str())
            .await
            .map_err(|e| SyncError::action("download", path.as_str(), e))?
        else {
            debug!("Remote item gone before download");
            return Ok(Outcome::Unchanged);
        };

        let absolute = path.to_absolute(&self.root);
        let local = digest_file(self.fs.as_ref(), &absolute)
            .await
            .map_err(|e| SyncError::action("download", path.as_str(), e))?;

        if let Some(local) = local {
            if local.fingerprint == item.fingerprint {
                if !self.is_recorded(path, &item.fingerprint).await? {
                    self.record(path, local.fingerprint, local.size).await?;
                }
                return Ok(Outcome::Unchanged);
            }
            info!("Local file differs from remote, keeping local copy");
            return Ok(Outcome::Unchanged);
        }

        let data = match self.objects.get_object(path.as_str()).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                return Err(SyncError::MissingObject {
                    path: path.to_string(),
                })
            }
            Err(e) => return Err(SyncError::action("download", path.as_str(), e)),
        };

        let actual = fingerprint(&data);
        if actual != item.fingerprint {
            return Err(SyncError::FingerprintMismatch {
                path: path.to_string(),
                expected: item.fingerprint,
                actual,
            });
        }

        let size = data.len() as u64;
        self.fs
            .write_file(&absolute, data)
            .await
            .map_err(|e| SyncError::action("download", path.as_str(), e))?;

        self.record(path, actual, size).await?;
        info!(size, "Downloaded item");
        Ok(Outcome::Applied)
    }

    /// Move an item from `old` to `new` on the remote side and locally.
    ///
    /// Without a local record for `old` there is nothing known to move, so
    /// the new path is uploaded instead.
    #[instrument(skip(self, old, new), fields(old = %old, new = %new))]
    pub async fn rename(&self, old: &RelativePath, new: &RelativePath) -> Result<Outcome> {
        let known = self
            .store
            .get_record(old.as_str())
            .await
            .map_err(|e| SyncError::action("rename", old.as_str(), e))?;

        if known.is_none() {
            debug!("No record for rename source, uploading target");
            return self.upload(new).await;
        }

        match self.objects.get_object(old.as_str()).await {
            Ok(data) => self
                .objects
                .put_object(new.as_str(), data)
                .await
                .map_err(|e| SyncError::action("rename", new.as_str(), e))?,
            Err(e) if e.is_not_found() => debug!("Source object already moved"),
            Err(e) => return Err(SyncError::action("rename", old.as_str(), e)),
        }

        tolerate_missing(self.remote.rename_item(old.as_str(), new.as_str()).await)
            .map_err(|e| SyncError::action("rename", old.as_str(), e))?;

        tolerate_missing(self.objects.delete_object(old.as_str()).await)
            .map_err(|e| SyncError::action("rename", old.as_str(), e))?;

        self.store
            .rename_record(old.as_str(), new.as_str())
            .await
            .map_err(|e| SyncError::action("rename", old.as_str(), e))?;

        info!("Renamed item");
        Ok(Outcome::Applied)
    }

    /// Delete an item remotely. Items already absent are not an error.
    #[instrument(skip(self, path), fields(path = %path))]
    pub async fn remove(&self, path: &RelativePath) -> Result<Outcome> {
        let descriptor = present(self.remote.delete_item(path.as_str()).await)
            .map_err(|e| SyncError::action("remove", path.as_str(), e))?;
        let object = present(self.objects.delete_object(path.as_str()).await)
            .map_err(|e| SyncError::action("remove", path.as_str(), e))?;

        if descriptor || object {
            info!("Removed remote item");
            Ok(Outcome::Applied)
        } else {
            Ok(Outcome::Unchanged)
        }
    }

    /// Forget the local record for a removed item.
    #[instrument(skip(self, path), fields(path = %path))]
    pub async fn local_remove(&self, path: &RelativePath) -> Result<Outcome> {
        let removed = self
            .store
            .delete_record(path.as_str())
            .await
            .map_err(|e| SyncError::action("local_remove", path.as_str(), e))?;

        Ok(if removed {
            Outcome::Applied
        } else {
            Outcome::Unchanged
        })
    }

    async fn read_local(&self, path: &RelativePath, absolute: &Path) -> Result<Option<bytes::Bytes>> {
        match self.fs.metadata(absolute).await {
            Ok(metadata) if metadata.is_directory || metadata.is_symlink => return Ok(None),
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(SyncError::action("upload", path.as_str(), e)),
        }

        match self.fs.read_file(absolute).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(SyncError::action("upload", path.as_str(), e)),
        }
    }

    async fn is_recorded(&self, path: &RelativePath, digest: &str) -> Result<bool> {
        let record = self
            .store
            .get_record(path.as_str())
            .await
            .map_err(|e| SyncError::action("lookup", path.as_str(), e))?;
        Ok(record.is_some_and(|r| r.fingerprint == digest))
    }

    async fn remote_matches(&self, path: &RelativePath, digest: &str) -> Result<bool> {
        let item = self
            .remote
            .get_item(path.as_str())
            .await
            .map_err(|e| SyncError::action("upload", path.as_str(), e))?;
        Ok(item.is_some_and(|item| item.fingerprint == digest))
    }

    async fn record(&self, path: &RelativePath, digest: String, size: u64) -> Result<()> {
        let record = LocalRecord::new(path.as_str(), digest, size, self.clock.unix_timestamp());
        self.store
            .upsert_record(&record)
            .await
            .map_err(|e| SyncError::action("record", path.as_str(), e))
    }
}

fn tolerate_missing(result: bridge_traits::error::Result<()>) -> std::result::Result<(), BridgeError> {
    present(result).map(|_| ())
}

/// `Ok(true)` if the target existed, `Ok(false)` if it was already absent.
fn present(result: bridge_traits::error::Result<()>) -> std::result::Result<bool, BridgeError> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
