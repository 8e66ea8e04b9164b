//! Event producer
//!
//! Runs each incoming change through the [`EventFilter`] and appends the
//! survivors to the queue. Events come from two sources: live watcher events
//! and the ordered list produced by the startup diff.
//!
//! Watchers report directory-level changes as a single event. Before
//! filtering, live events that name a directory are expanded into per-file
//! events:
//!
//! - `Created` for a directory becomes `Created` for every file below it
//! - `Removed` for a path with no record becomes `Removed` for every record below it
//! - `Renamed` of a directory becomes `Renamed` for every record below the old
//!   path, plus `Created` for files under the new path that had no record yet
//!
//! A rename across the ignore boundary is rewritten first: moving a tracked
//! item to an ignored name is a removal, and moving an ignored item to a
//! tracked name is a creation.

use bridge_traits::{metadata::LocalMetadataStore, storage::FileSystemAccess};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::diff_check::ServerDiffList;
use crate::error::Result;
use crate::event::{ChangeEvent, ChangeKind, EventId, RelativePath};
use crate::filter::{DropReason, EventFilter, Verdict};
use crate::queue::QueueSender;

/// Where a batch of events comes from
#[derive(Debug, Clone)]
pub enum EventSource {
    Live(ChangeEvent),
    Seeded(ServerDiffList),
}

/// Result of submitting one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Queued(EventId),
    Dropped(DropReason),
    /// A directory-level event fanned out into per-file events
    Expanded { queued: usize, dropped: usize },
}

impl Admission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Admission::Queued(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub accepted: u64,
    pub dropped: u64,
}

pub struct EventProducer {
    root: PathBuf,
    fs: Arc<dyn FileSystemAccess>,
    store: Arc<dyn LocalMetadataStore>,
    filter: EventFilter,
    queue: QueueSender,
    stats: ProducerStats,
}

impl EventProducer {
    pub fn new(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystemAccess>,
        store: Arc<dyn LocalMetadataStore>,
        filter: EventFilter,
        queue: QueueSender,
    ) -> Self {
        Self {
            root: root.into(),
            fs,
            store,
            filter,
            queue,
            stats: ProducerStats::default(),
        }
    }

    /// Filter one event and queue it if it survives.
    ///
    /// Fails only when the queue has been stopped.
    #[instrument(skip(self, event), fields(event = %event))]
    pub async fn push_event(&mut self, event: ChangeEvent) -> Result<Admission> {
        let event = self.rewrite_ignored_rename(event);
        if !event.is_seeded() {
            if let Some(expanded) = self.expand_directory(&event).await {
                debug!(count = expanded.len(), "Expanded directory event");
                let mut queued = 0;
                let mut dropped = 0;
                for child in expanded {
                    match self.admit(child).await? {
                        Admission::Queued(_) => queued += 1,
                        _ => dropped += 1,
                    }
                }
                return Ok(Admission::Expanded { queued, dropped });
            }
        }

        self.admit(event).await
    }

    /// Push a single live event or a whole seeded diff, in order.
    pub async fn push_source(&mut self, source: EventSource) -> Result<Vec<Admission>> {
        match source {
            EventSource::Live(event) => Ok(vec![self.push_event(event).await?]),
            EventSource::Seeded(diff) => {
                let mut admissions = Vec::with_capacity(diff.events.len());
                for event in diff.events {
                    admissions.push(self.push_event(event.seeded()).await?);
                }
                Ok(admissions)
            }
        }
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    pub fn queue(&self) -> &QueueSender {
        &self.queue
    }

    async fn admit(&mut self, event: ChangeEvent) -> Result<Admission> {
        match self.filter.evaluate(&event).await {
            Verdict::Keep => {
                let id = self.queue.push(event).await?;
                self.stats.accepted += 1;
                Ok(Admission::Queued(id))
            }
            Verdict::Drop(reason) => {
                debug!(reason = reason.as_str(), event = %event, "Dropped event");
                self.stats.dropped += 1;
                Ok(Admission::Dropped(reason))
            }
        }
    }

    fn rewrite_ignored_rename(&self, event: ChangeEvent) -> ChangeEvent {
        let Some(old) = event.old_path() else {
            return event;
        };

        let ignore = self.filter.ignore_rules();
        let rewritten = match (ignore.is_ignored(old), ignore.is_ignored(event.path())) {
            (true, false) => ChangeEvent::created(event.path().clone()),
            (false, true) => ChangeEvent::removed(old.clone()),
            _ => return event,
        };

        debug!(from = %event, to = %rewritten, "Rename crosses ignore rules");
        if event.is_seeded() {
            rewritten.seeded()
        } else {
            rewritten
        }
    }

    async fn expand_directory(&self, event: &ChangeEvent) -> Option<Vec<ChangeEvent>> {
        match event.kind() {
            ChangeKind::Created => {
                let files = self.files_on_disk(event.path()).await?;
                Some(files.into_iter().map(ChangeEvent::created).collect())
            }
            ChangeKind::Removed => {
                let children = self.records_below(event.path()).await?;
                if children.is_empty() {
                    return None;
                }
                Some(children.into_iter().map(ChangeEvent::removed).collect())
            }
            ChangeKind::Renamed => {
                let old = event.old_path()?;
                self.expand_renamed(old, event.path()).await
            }
            ChangeKind::Modified | ChangeKind::Download => None,
        }
    }

    async fn expand_renamed(
        &self,
        old: &RelativePath,
        new: &RelativePath,
    ) -> Option<Vec<ChangeEvent>> {
        let children = self.records_below(old).await?;
        let moved: Vec<(RelativePath, RelativePath)> = children
            .into_iter()
            .filter_map(|child| {
                let target = child.rebase(old, new)?;
                Some((child, target))
            })
            .collect();

        let on_disk = self.files_on_disk(new).await;
        if moved.is_empty() && on_disk.is_none() {
            return None;
        }

        let covered: HashSet<&RelativePath> = moved.iter().map(|(_, target)| target).collect();
        let unsynced: Vec<ChangeEvent> = on_disk
            .unwrap_or_default()
            .into_iter()
            .filter(|file| !covered.contains(file))
            .map(ChangeEvent::created)
            .collect();

        let mut events: Vec<ChangeEvent> = moved
            .into_iter()
            .map(|(child, target)| ChangeEvent::renamed(child, target))
            .collect();
        events.extend(unsynced);
        Some(events)
    }

    /// Files below `dir` on disk, or `None` if `dir` is not a directory.
    async fn files_on_disk(&self, dir: &RelativePath) -> Option<Vec<RelativePath>> {
        let absolute = dir.to_absolute(&self.root);
        match self.fs.metadata(&absolute).await {
            Ok(metadata) if metadata.is_directory && !metadata.is_symlink => {}
            _ => return None,
        }

        let files = match self.fs.list_files_recursive(&absolute).await {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %dir, "Could not list directory: {}", e);
                return Some(Vec::new());
            }
        };

        Some(
            files
                .iter()
                .filter_map(|file| RelativePath::from_absolute(&self.root, file).ok())
                .collect(),
        )
    }

    /// Records strictly below `dir`, when `dir` itself has no record.
    async fn records_below(&self, dir: &RelativePath) -> Option<Vec<RelativePath>> {
        match self.store.get_record(dir.as_str()).await {
            Ok(None) => {}
            _ => return None,
        }

        let records = self.store.all_records().await.ok()?;
        let mut children: Vec<RelativePath> = records
            .into_iter()
            .filter_map(|record| RelativePath::new(&record.path).ok())
            .filter(|path| path.is_under(dir))
            .collect();

        children.sort();
        Some(children)
    }
}
