//! Workspace facade crate.
//!
//! Re-exports the workspace crates so a host can depend on `folder-sync`
//! alone. The `desktop` feature (on by default) adds the tokio, SQLite, and
//! reqwest adapters.

pub use bridge_traits;
pub use core_runtime;
pub use core_sync;

#[cfg(feature = "desktop")]
pub use bridge_desktop;
