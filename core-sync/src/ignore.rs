//! Ignore rules
//!
//! Paths inside the agent's control directory and the filesystem adapter's
//! `.name.partial` staging files are always ignored. Configured glob patterns
//! are matched against both the full relative path and the file name, so
//! `*.tmp` ignores temp files at any depth.

use core_runtime::config::CONTROL_DIR;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Result, SyncError};
use crate::event::RelativePath;

const STAGING_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: GlobSet,
    count: usize,
}

impl IgnoreRules {
    /// Compile the configured patterns. Invalid globs are rejected.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| SyncError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }

        let patterns_set = builder.build().map_err(|e| SyncError::InvalidPattern {
            pattern: String::new(),
            message: e.to_string(),
        })?;

        Ok(Self {
            count: patterns_set.len(),
            patterns: patterns_set,
        })
    }

    /// Rules with only the built-in exclusions
    pub fn builtin() -> Self {
        Self {
            patterns: GlobSet::empty(),
            count: 0,
        }
    }

    /// Number of configured patterns
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_ignored(&self, path: &RelativePath) -> bool {
        if path.first_segment() == CONTROL_DIR {
            return true;
        }

        let name = path.file_name();
        if name.starts_with('.') && name.ends_with(STAGING_SUFFIX) {
            return true;
        }

        self.patterns.is_match(path.as_str()) || self.patterns.is_match(name)
    }
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::builtin()
    }
}
