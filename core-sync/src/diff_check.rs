//! Initial diff check
//!
//! Runs once at startup, before the folder watcher. Both sides are listed in
//! full and compared path by path; the result is an ordered list of seeded
//! events that the producer feeds to the same consumer as live events.
//!
//! | disk | record | remote | result |
//! |------|--------|--------|--------|
//! | present | any | absent | `Created` |
//! | present | any | different fingerprint | `Modified` |
//! | present | any | same fingerprint | none, record repaired if missing or stale |
//! | absent | present | any | `Removed` |
//! | absent | absent | present | `Download` |
//!
//! Moves are not detected: a moved file shows up as a tombstone plus a new
//! path, so it becomes `Removed` followed by `Created`. The list is ordered
//! removals first, then downloads, then uploads, each group by path.

use bridge_traits::{
    metadata::{LocalMetadataStore, LocalRecord},
    remote::RemoteMetadataService,
    storage::FileSystemAccess,
    time::Clock,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::event::{ChangeEvent, ChangeKind, RelativePath};
use crate::fingerprint::digest_file;
use crate::ignore::IgnoreRules;

/// Fingerprint and size of one side's copy of an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemState {
    pub fingerprint: String,
    pub size: u64,
}

impl ItemState {
    pub fn new(fingerprint: impl Into<String>, size: u64) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            size,
        }
    }
}

/// What the local side knows about one path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalEntry {
    /// File currently on disk
    pub disk: Option<ItemState>,
    /// Fingerprint recorded at the last successful sync
    pub synced: Option<String>,
}

impl LocalEntry {
    /// Synced once, deleted from disk since
    pub fn is_tombstone(&self) -> bool {
        self.disk.is_none() && self.synced.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    entries: BTreeMap<RelativePath, LocalEntry>,
}

impl LocalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file found on disk.
    pub fn insert_disk(&mut self, path: RelativePath, state: ItemState) {
        self.entries.entry(path).or_default().disk = Some(state);
    }

    /// Record a local store entry.
    pub fn insert_synced(&mut self, path: RelativePath, fingerprint: impl Into<String>) {
        self.entries.entry(path).or_default().synced = Some(fingerprint.into());
    }

    pub fn get(&self, path: &RelativePath) -> Option<&LocalEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelativePath, &LocalEntry)> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    items: BTreeMap<RelativePath, ItemState>,
}

impl RemoteSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: RelativePath, state: ItemState) {
        self.items.insert(path, state);
    }

    pub fn get(&self, path: &RelativePath) -> Option<&ItemState> {
        self.items.get(path)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A local record to write without any remote I/O
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRecordRepair {
    pub path: RelativePath,
    pub fingerprint: String,
    pub size: u64,
}

/// Ordered seeded events plus record repairs
#[derive(Debug, Clone, Default)]
pub struct ServerDiffList {
    pub events: Vec<ChangeEvent>,
    pub repairs: Vec<LocalRecordRepair>,
}

impl ServerDiffList {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.repairs.is_empty()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }
}

/// Walk the watched folder and join the local store's records.
#[instrument(skip_all, fields(root = %root.display()))]
pub async fn build_local_snapshot(
    root: &Path,
    fs: &dyn FileSystemAccess,
    store: &dyn LocalMetadataStore,
    ignore: &IgnoreRules,
) -> Result<LocalSnapshot> {
    let mut snapshot = LocalSnapshot::new();

    for file in fs.list_files_recursive(root).await? {
        let path = match RelativePath::from_absolute(root, &file) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping file: {}", e);
                continue;
            }
        };
        if ignore.is_ignored(&path) {
            continue;
        }

        // A file deleted mid-walk is simply absent from the snapshot.
        if let Some(digest) = digest_file(fs, &file).await? {
            snapshot.insert_disk(path, ItemState::new(digest.fingerprint, digest.size));
        }
    }

    for record in store.all_records().await? {
        match RelativePath::new(&record.path) {
            Ok(path) if !ignore.is_ignored(&path) => {
                snapshot.insert_synced(path, record.fingerprint)
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping local record: {}", e),
        }
    }

    debug!(entries = snapshot.len(), "Built local snapshot");
    Ok(snapshot)
}

/// List every remote descriptor.
#[instrument(skip_all)]
pub async fn build_remote_snapshot(
    remote: &dyn RemoteMetadataService,
    ignore: &IgnoreRules,
) -> Result<RemoteSnapshot> {
    let items = remote
        .list_items()
        .await
        .map_err(|e| SyncError::action("list", "remote items", e))?;

    let mut snapshot = RemoteSnapshot::new();
    for item in items {
        match RelativePath::new(&item.path) {
            Ok(path) if !ignore.is_ignored(&path) => {
                snapshot.insert(path, ItemState::new(item.fingerprint, item.size))
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping remote item: {}", e),
        }
    }

    debug!(items = snapshot.len(), "Built remote snapshot");
    Ok(snapshot)
}

/// Compare two snapshots. Pure; performs no I/O.
pub fn compute(local: &LocalSnapshot, remote: &RemoteSnapshot) -> ServerDiffList {
    let paths: BTreeSet<&RelativePath> = local.entries.keys().chain(remote.items.keys()).collect();

    let mut removals = Vec::new();
    let mut downloads = Vec::new();
    let mut uploads = Vec::new();
    let mut repairs = Vec::new();

    for path in paths {
        let entry = local.get(path);
        let disk = entry.and_then(|e| e.disk.as_ref());
        let synced = entry.and_then(|e| e.synced.as_deref());
        let remote_state = remote.get(path);

        match (disk, remote_state) {
            (Some(_), None) => uploads.push(ChangeEvent::created(path.clone()).seeded()),
            (Some(disk), Some(remote_state)) if disk.fingerprint != remote_state.fingerprint => {
                uploads.push(ChangeEvent::modified(path.clone()).seeded())
            }
            (Some(disk), Some(_)) => {
                if synced != Some(disk.fingerprint.as_str()) {
                    repairs.push(LocalRecordRepair {
                        path: path.clone(),
                        fingerprint: disk.fingerprint.clone(),
                        size: disk.size,
                    });
                }
            }
            (None, _) if synced.is_some() => {
                removals.push(ChangeEvent::removed(path.clone()).seeded())
            }
            (None, Some(_)) => downloads.push(ChangeEvent::download(path.clone())),
            (None, None) => {}
        }
    }

    let mut events = removals;
    events.extend(downloads);
    events.extend(uploads);

    ServerDiffList { events, repairs }
}

/// Write the repaired records. Returns how many were written.
pub async fn apply_repairs(
    diff: &ServerDiffList,
    store: &dyn LocalMetadataStore,
    clock: &dyn Clock,
) -> Result<usize> {
    let synced_at = clock.unix_timestamp();
    for repair in &diff.repairs {
        let record = LocalRecord::new(
            repair.path.as_str(),
            repair.fingerprint.clone(),
            repair.size,
            synced_at,
        );
        store
            .upsert_record(&record)
            .await
            .map_err(|e| SyncError::action("repair", repair.path.as_str(), e))?;
    }
    Ok(diff.repairs.len())
}

/// Build both snapshots and compare them.
pub async fn initial_diff_check(
    root: &Path,
    fs: &dyn FileSystemAccess,
    store: &dyn LocalMetadataStore,
    remote: &dyn RemoteMetadataService,
    ignore: &IgnoreRules,
) -> Result<ServerDiffList> {
    info!("Phase 1: Building local snapshot");
    let local = build_local_snapshot(root, fs, store, ignore).await?;

    info!("Phase 2: Listing remote items");
    let remote = build_remote_snapshot(remote, ignore).await?;

    info!("Phase 3: Computing differences");
    let diff = compute(&local, &remote);
    info!(
        removals = diff.count(ChangeKind::Removed),
        downloads = diff.count(ChangeKind::Download),
        uploads = diff.count(ChangeKind::Created) + diff.count(ChangeKind::Modified),
        repairs = diff.repairs.len(),
        "Initial diff computed"
    );
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    fn kinds(diff: &ServerDiffList) -> Vec<(ChangeKind, String)> {
        diff.events
            .iter()
            .map(|e| (e.kind(), e.path().to_string()))
            .collect()
    }

    #[test]
    fn test_fresh_remote_empty_local() {
        let local = LocalSnapshot::new();
        let mut remote = RemoteSnapshot::new();
        remote.insert(path("b.txt"), ItemState::new("fp2", 2));
        remote.insert(path("a.txt"), ItemState::new("fp1", 1));

        let diff = compute(&local, &remote);
        assert_eq!(
            kinds(&diff),
            vec![
                (ChangeKind::Download, "a.txt".to_string()),
                (ChangeKind::Download, "b.txt".to_string()),
            ]
        );
        assert!(diff.events.iter().all(|e| e.is_seeded()));
        assert!(diff.repairs.is_empty());
    }

    #[test]
    fn test_decision_table() {
        let mut local = LocalSnapshot::new();
        let mut remote = RemoteSnapshot::new();

        // local only
        local.insert_disk(path("new.txt"), ItemState::new("n", 1));
        // changed locally
        local.insert_disk(path("edit.txt"), ItemState::new("e2", 1));
        local.insert_synced(path("edit.txt"), "e1");
        remote.insert(path("edit.txt"), ItemState::new("e1", 1));
        // identical, record missing
        local.insert_disk(path("same.txt"), ItemState::new("s", 1));
        remote.insert(path("same.txt"), ItemState::new("s", 1));
        // identical, record current
        local.insert_disk(path("quiet.txt"), ItemState::new("q", 1));
        local.insert_synced(path("quiet.txt"), "q");
        remote.insert(path("quiet.txt"), ItemState::new("q", 1));
        // deleted locally
        local.insert_synced(path("gone.txt"), "g");
        remote.insert(path("gone.txt"), ItemState::new("g", 1));
        // stale record
        local.insert_synced(path("stale.txt"), "x");
        // remote only
        remote.insert(path("remote.txt"), ItemState::new("r", 1));

        let diff = compute(&local, &remote);
        assert_eq!(
            kinds(&diff),
            vec![
                (ChangeKind::Removed, "gone.txt".to_string()),
                (ChangeKind::Removed, "stale.txt".to_string()),
                (ChangeKind::Download, "remote.txt".to_string()),
                (ChangeKind::Modified, "edit.txt".to_string()),
                (ChangeKind::Created, "new.txt".to_string()),
            ]
        );
        assert_eq!(
            diff.repairs,
            vec![LocalRecordRepair {
                path: path("same.txt"),
                fingerprint: "s".to_string(),
                size: 1,
            }]
        );
    }

    #[test]
    fn test_move_is_remove_then_add() {
        let mut local = LocalSnapshot::new();
        let mut remote = RemoteSnapshot::new();

        local.insert_synced(path("z-old.txt"), "fp");
        local.insert_disk(path("a-new.txt"), ItemState::new("fp", 3));
        remote.insert(path("z-old.txt"), ItemState::new("fp", 3));

        let diff = compute(&local, &remote);
        assert_eq!(
            kinds(&diff),
            vec![
                (ChangeKind::Removed, "z-old.txt".to_string()),
                (ChangeKind::Created, "a-new.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_identical_sides_yield_nothing() {
        let mut local = LocalSnapshot::new();
        let mut remote = RemoteSnapshot::new();
        for name in ["a.txt", "dir/b.txt", "dir/sub/c.txt"] {
            local.insert_disk(path(name), ItemState::new(name, 1));
            local.insert_synced(path(name), name);
            remote.insert(path(name), ItemState::new(name, 1));
        }

        assert!(compute(&local, &remote).is_empty());
    }
}
