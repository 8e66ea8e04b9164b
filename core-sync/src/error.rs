use bridge_traits::error::{BridgeError, FailureClass};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{action} failed for {path}: {source}")]
    Action {
        action: &'static str,
        path: String,
        #[source]
        source: BridgeError,
    },

    #[error("Fingerprint mismatch for {path}: expected {expected}, got {actual}")]
    FingerprintMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Remote object missing for {path}")]
    MissingObject { path: String },

    #[error("Invalid relative path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid ignore pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Event queue closed")]
    QueueClosed,

    #[error("Consumer startup failed: {0}")]
    Startup(String),

    #[error("Folder watcher error: {0}")]
    Watcher(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl SyncError {
    pub(crate) fn action(action: &'static str, path: impl Into<String>, source: BridgeError) -> Self {
        SyncError::Action {
            action,
            path: path.into(),
            source,
        }
    }

    /// How the consumer should treat this failure.
    pub fn class(&self) -> FailureClass {
        match self {
            SyncError::Action { source, .. } | SyncError::Bridge(source) => source.classify(),
            SyncError::FingerprintMismatch { .. } => FailureClass::Transient,
            SyncError::MissingObject { .. }
            | SyncError::InvalidPath { .. }
            | SyncError::InvalidPattern { .. }
            | SyncError::QueueClosed
            | SyncError::Startup(_)
            | SyncError::Watcher(_)
            | SyncError::Worker(_) => FailureClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
