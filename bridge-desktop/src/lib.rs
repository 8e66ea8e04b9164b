//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`
//! - `LocalMetadataStore` using an SQLite database under the control directory
//! - `RemoteMetadataService` using `reqwest` with JSON bodies
//! - `ObjectStore` using `reqwest` against a path-style bucket endpoint
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{HttpMetadataClient, SqliteMetadataStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fs = TokioFileSystem::new();
//!     let store = SqliteMetadataStore::open(Path::new("/data/.ignore/local.db")).await?;
//!     let remote = HttpMetadataClient::new("localhost", 8000)?;
//!     // Hand these to the sync pipeline
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;
mod metadata_store;
mod object_store;
mod remote_client;

pub use filesystem::TokioFileSystem;
pub use metadata_store::SqliteMetadataStore;
pub use object_store::{HttpObjectStore, ObjectStoreConfig};
pub use remote_client::HttpMetadataClient;
