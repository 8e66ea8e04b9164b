//! Event filter
//!
//! Decides whether a raw [`ChangeEvent`] is worth queueing. The checks run in
//! order and the first one that drops the event wins:
//!
//! 1. ignored path (control directory, staging files, configured globs)
//! 2. identical live event accepted within the debounce window
//! 3. live `Created`/`Modified` for a directory or a path that no longer exists
//! 4. live `Created`/`Modified` whose content fingerprint matches the local record
//! 5. live `Removed` for a path the local store has never synced
//! 6. live `Renamed` with no record for the old path but a record for the new one
//!
//! A rename with only one ignored side is dropped here too; the producer
//! rewrites those into a removal or a creation before they reach the filter.
//!
//! Seeded events come from a fresh comparison and skip checks 2 to 6. Any
//! failure while consulting the disk or the local store keeps the event, since
//! dropping a real change is worse than one redundant action.

use bridge_traits::{metadata::LocalMetadataStore, storage::FileSystemAccess};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::event::{ChangeEvent, ChangeKind, RelativePath};
use crate::fingerprint::digest_file;
use crate::ignore::IgnoreRules;

const DEBOUNCE_PRUNE_THRESHOLD: usize = 1024;

/// Why an event was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Ignored,
    Debounced,
    NotAFile,
    AlreadySynced,
    NeverSynced,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Ignored => "ignored",
            DropReason::Debounced => "debounced",
            DropReason::NotAFile => "not_a_file",
            DropReason::AlreadySynced => "already_synced",
            DropReason::NeverSynced => "never_synced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Drop(DropReason),
}

type DebounceKey = (ChangeKind, RelativePath, Option<RelativePath>);

pub struct EventFilter {
    root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    store: Arc<dyn LocalMetadataStore>,
    ignore: IgnoreRules,
    debounce: Duration,
    recent: HashMap<DebounceKey, Instant>,
}

impl EventFilter {
    pub fn new(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemAccess>,
        store: Arc<dyn LocalMetadataStore>,
        ignore: IgnoreRules,
    ) -> Self {
        Self {
            root: root.into(),
            fs,
            store,
            ignore,
            debounce: Duration::ZERO,
            recent: HashMap::new(),
        }
    }

    /// Drop repeats of an identical live event within `window`.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn ignore_rules(&self) -> &IgnoreRules {
        &self.ignore
    }

    pub async fn evaluate(&mut self, event: &ChangeEvent) -> Verdict {
        let ignored = self.ignore.is_ignored(event.path())
            || event.old_path().is_some_and(|old| self.ignore.is_ignored(old));
        if ignored {
            return Verdict::Drop(DropReason::Ignored);
        }

        if event.is_seeded() {
            return Verdict::Keep;
        }

        if self.is_debounced(event) {
            return Verdict::Drop(DropReason::Debounced);
        }

        let verdict = match event.kind() {
            ChangeKind::Created | ChangeKind::Modified => self.check_content(event.path()).await,
            ChangeKind::Removed => self.check_known(event.path()).await,
            ChangeKind::Renamed => self.check_rename(event).await,
            ChangeKind::Download => Verdict::Keep,
        };

        if verdict == Verdict::Keep {
            self.remember(event);
        }
        verdict
    }

    async fn check_content(&self, path: &RelativePath) -> Verdict {
        let digest = match digest_file(self.fs.as_ref(), &path.to_absolute(&self.root)).await {
            Ok(Some(digest)) => digest,
            Ok(None) => return Verdict::Drop(DropReason::NotAFile),
            Err(e) => {
                warn!(path = %path, "Could not fingerprint file, keeping event: {}", e);
                return Verdict::Keep;
            }
        };

        match self.store.get_record(path.as_str()).await {
            Ok(Some(record)) if record.fingerprint == digest.fingerprint => {
                Verdict::Drop(DropReason::AlreadySynced)
            }
            Ok(_) => Verdict::Keep,
            Err(e) => {
                warn!(path = %path, "Local store unavailable, keeping event: {}", e);
                Verdict::Keep
            }
        }
    }

    async fn check_known(&self, path: &RelativePath) -> Verdict {
        match self.store.get_record(path.as_str()).await {
            Ok(Some(_)) => Verdict::Keep,
            Ok(None) => Verdict::Drop(DropReason::NeverSynced),
            Err(e) => {
                warn!(path = %path, "Local store unavailable, keeping event: {}", e);
                Verdict::Keep
            }
        }
    }

    async fn check_rename(&self, event: &ChangeEvent) -> Verdict {
        let Some(old) = event.old_path() else {
            return Verdict::Keep;
        };

        let old_record = self.store.get_record(old.as_str()).await;
        let new_record = self.store.get_record(event.path().as_str()).await;
        match (old_record, new_record) {
            (Ok(None), Ok(Some(_))) => Verdict::Drop(DropReason::AlreadySynced),
            (Ok(_), Ok(_)) => Verdict::Keep,
            (Err(e), _) | (_, Err(e)) => {
                warn!(path = %event.path(), "Local store unavailable, keeping event: {}", e);
                Verdict::Keep
            }
        }
    }

    fn key(event: &ChangeEvent) -> DebounceKey {
        (event.kind(), event.path().clone(), event.old_path().cloned())
    }

    fn is_debounced(&self, event: &ChangeEvent) -> bool {
        if self.debounce.is_zero() {
            return false;
        }

        self.recent
            .get(&Self::key(event))
            .is_some_and(|at| at.elapsed() < self.debounce)
    }

    fn remember(&mut self, event: &ChangeEvent) {
        if self.debounce.is_zero() {
            return;
        }

        let now = Instant::now();
        if self.recent.len() >= DEBOUNCE_PRUNE_THRESHOLD {
            let window = self.debounce;
            self.recent.retain(|_, at| now.duration_since(*at) < window);
            debug!(remaining = self.recent.len(), "Pruned debounce window");
        }
        self.recent.insert(Self::key(event), now);
    }
}
