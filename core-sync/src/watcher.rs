//! Folder watcher
//!
//! Adapts `notify` to the producer. The OS callback only maps raw events and
//! hands them to an unbounded channel, so it never waits on the producer. A
//! tokio task owns the [`EventProducer`] and feeds it in arrival order.

use core_runtime::events::{CoreEvent, EventBus, WatcherEvent};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::event::{ChangeEvent, RelativePath};
use crate::producer::{EventProducer, ProducerStats};

enum RawEvent {
    Change(ChangeEvent),
    Failed(String),
}

pub struct FolderWatcher {
    watcher: RecommendedWatcher,
    shutdown: CancellationToken,
    task: JoinHandle<ProducerStats>,
}

impl FolderWatcher {
    /// Start watching `root` recursively, feeding `producer`.
    pub fn start(
        root: impl Into<PathBuf>,
        producer: EventProducer,
        event_bus: Option<EventBus>,
    ) -> Result<Self> {
        let root = root.into();
        let canonical = std::fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        let roots = [root.clone(), canonical];
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for change in map_event(&roots, &event) {
                        if tx.send(RawEvent::Change(change)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tx.send(RawEvent::Failed(e.to_string())).ok();
                }
            }
        })
        .map_err(|e| SyncError::Watcher(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Watcher(format!("cannot watch {}: {}", root.display(), e)))?;

        info!(root = %root.display(), "Folder watcher started");
        if let Some(bus) = &event_bus {
            bus.emit(CoreEvent::Watcher(WatcherEvent::Started {
                root: root.display().to_string(),
            }))
            .ok();
        }

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(feed(rx, producer, shutdown.clone(), event_bus));

        Ok(Self {
            watcher,
            shutdown,
            task,
        })
    }

    /// Stop the OS watcher and wait for the feeding task.
    pub async fn stop(self) -> Result<ProducerStats> {
        drop(self.watcher);
        self.shutdown.cancel();
        self.task
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))
    }
}

async fn feed(
    mut rx: mpsc::UnboundedReceiver<RawEvent>,
    mut producer: EventProducer,
    shutdown: CancellationToken,
    event_bus: Option<EventBus>,
) -> ProducerStats {
    loop {
        let raw = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            raw = rx.recv() => match raw {
                Some(raw) => Some(raw),
                None => break,
            },
        };

        // Events the OS already delivered still reach the queue.
        let Some(raw) = raw else {
            let mut drained = 0;
            while let Ok(raw) = rx.try_recv() {
                drained += 1;
                if !forward(raw, &mut producer, event_bus.as_ref()).await {
                    break;
                }
            }
            debug!(drained, "Drained pending watcher events");
            break;
        };

        if !forward(raw, &mut producer, event_bus.as_ref()).await {
            break;
        }
    }

    let stats = producer.stats();
    info!(
        accepted = stats.accepted,
        dropped = stats.dropped,
        "Folder watcher stopped"
    );
    if let Some(bus) = &event_bus {
        bus.emit(CoreEvent::Watcher(WatcherEvent::Stopped)).ok();
    }
    stats
}

/// Returns `false` once the queue no longer accepts events.
async fn forward(
    raw: RawEvent,
    producer: &mut EventProducer,
    event_bus: Option<&EventBus>,
) -> bool {
    match raw {
        RawEvent::Change(event) => {
            if let Err(e) = producer.push_event(event).await {
                warn!("Queue closed, watcher stopping: {}", e);
                return false;
            }
        }
        RawEvent::Failed(message) => {
            error!("Watcher error: {}", message);
            if let Some(bus) = event_bus {
                bus.emit(CoreEvent::Watcher(WatcherEvent::Error { message }))
                    .ok();
            }
        }
    }
    true
}

fn relative(roots: &[PathBuf], path: &Path) -> Option<RelativePath> {
    roots
        .iter()
        .find_map(|root| RelativePath::from_absolute(root, path).ok())
}

/// Translate one notify event into change events.
///
/// Paths outside every root are skipped. Access and other event kinds carry
/// no content change and map to nothing.
pub fn map_event(roots: &[PathBuf], event: &Event) -> Vec<ChangeEvent> {
    let paths = &event.paths;
    let each = |make: fn(RelativePath) -> ChangeEvent| -> Vec<ChangeEvent> {
        paths
            .iter()
            .filter_map(|p| relative(roots, p))
            .map(make)
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => each(ChangeEvent::created),
        EventKind::Remove(_) => each(ChangeEvent::removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            match (relative(roots, &paths[0]), relative(roots, &paths[1])) {
                (Some(old), Some(new)) => vec![ChangeEvent::renamed(old, new)],
                (Some(old), None) => vec![ChangeEvent::removed(old)],
                (None, Some(new)) => vec![ChangeEvent::created(new)],
                (None, None) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeEvent::removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(ChangeEvent::created),
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .filter_map(|p| {
                let rel = relative(roots, p)?;
                Some(if p.exists() {
                    ChangeEvent::created(rel)
                } else {
                    ChangeEvent::removed(rel)
                })
            })
            .collect(),
        EventKind::Modify(_) => each(ChangeEvent::modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {
            debug!(kind = ?event.kind, "Ignoring watcher event");
            Vec::new()
        }
    }
}
