//! Change Event Model
//!
//! A [`ChangeEvent`] names one item-level change in the watched folder. Paths
//! are carried as [`RelativePath`]s, always `/`-separated and relative to the
//! watched root, which is also how items are keyed remotely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Normalized item path relative to the watched root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Parse and normalize a relative path.
    ///
    /// Backslashes become `/`, empty and `.` segments are dropped. Absolute
    /// prefixes are stripped. `..` segments and empty results are rejected.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        let normalized = raw.replace('\\', "/");

        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(invalid(raw, "parent segments are not allowed")),
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Err(invalid(raw, "path is empty"));
        }

        Ok(Self(segments.join("/")))
    }

    /// Derive the relative path of `path` under `root`.
    pub fn from_absolute(root: &Path, path: &Path) -> Result<Self> {
        let relative = path
            .strip_prefix(root)
            .map_err(|_| invalid(&path.display().to_string(), "outside the watched root"))?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(part) => segments.push(part),
                    None => {
                        return Err(invalid(
                            &path.display().to_string(),
                            "path is not valid UTF-8",
                        ))
                    }
                },
                Component::CurDir => continue,
                _ => return Err(invalid(&path.display().to_string(), "unexpected component")),
            }
        }

        Self::new(segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this item under `root`
    pub fn to_absolute(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }

    /// Final path segment
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// First path segment
    pub fn first_segment(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Whether this path lies strictly below the directory `dir`
    pub fn is_under(&self, dir: &RelativePath) -> bool {
        self.0.len() > dir.0.len()
            && self.0.starts_with(dir.as_str())
            && self.0.as_bytes()[dir.0.len()] == b'/'
    }

    /// Re-root a path below `from` onto `to`.
    pub fn rebase(&self, from: &RelativePath, to: &RelativePath) -> Option<RelativePath> {
        if !self.is_under(from) {
            return None;
        }
        let rest = &self.0[from.0.len() + 1..];
        Some(RelativePath(format!("{}/{}", to.0, rest)))
    }
}

fn invalid(path: &str, reason: &str) -> SyncError {
    SyncError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
    Removed,
    /// Remote has an item the local folder lacks
    Download,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Removed => "removed",
            ChangeKind::Download => "download",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Reported by the folder watcher
    Live,
    /// Produced by the startup diff check
    Seeded,
}

/// One item-level change. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    kind: ChangeKind,
    path: RelativePath,
    old_path: Option<RelativePath>,
    origin: EventOrigin,
}

impl ChangeEvent {
    fn live(kind: ChangeKind, path: RelativePath) -> Self {
        Self {
            kind,
            path,
            old_path: None,
            origin: EventOrigin::Live,
        }
    }

    pub fn created(path: RelativePath) -> Self {
        Self::live(ChangeKind::Created, path)
    }

    pub fn modified(path: RelativePath) -> Self {
        Self::live(ChangeKind::Modified, path)
    }

    pub fn removed(path: RelativePath) -> Self {
        Self::live(ChangeKind::Removed, path)
    }

    pub fn renamed(old_path: RelativePath, new_path: RelativePath) -> Self {
        Self {
            kind: ChangeKind::Renamed,
            path: new_path,
            old_path: Some(old_path),
            origin: EventOrigin::Live,
        }
    }

    /// Download events only originate from the startup diff.
    pub fn download(path: RelativePath) -> Self {
        Self::live(ChangeKind::Download, path).seeded()
    }

    /// Mark this event as produced by the startup diff.
    pub fn seeded(mut self) -> Self {
        self.origin = EventOrigin::Seeded;
        self
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Target path (the new path for renames)
    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    /// Source path, set only for renames
    pub fn old_path(&self) -> Option<&RelativePath> {
        self.old_path.as_ref()
    }

    pub fn origin(&self) -> EventOrigin {
        self.origin
    }

    pub fn is_seeded(&self) -> bool {
        self.origin == EventOrigin::Seeded
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.old_path {
            Some(old) => write!(f, "{} {} -> {}", self.kind, old, self.path),
            None => write!(f, "{} {}", self.kind, self.path),
        }
    }
}

/// Unique identifier for a queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An accepted event as it travels through the queue
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub id: EventId,
    pub event: ChangeEvent,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedEvent {
    pub fn new(event: ChangeEvent) -> Self {
        Self {
            id: EventId::new(),
            event,
            enqueued_at: Utc::now(),
        }
    }
}
