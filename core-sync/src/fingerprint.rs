//! Content fingerprints
//!
//! Items are compared by the lowercase hex SHA-256 of their bytes. The same
//! value is stored in local records and remote descriptors.

use bridge_traits::{error::Result, storage::FileSystemAccess};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Fingerprint and size of a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub fingerprint: String,
    pub size: u64,
}

pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Read and fingerprint a regular file.
///
/// Returns `None` when the path is missing, a directory, or a symlink.
pub async fn digest_file(fs: &dyn FileSystemAccess, path: &Path) -> Result<Option<FileDigest>> {
    match fs.metadata(path).await {
        Ok(metadata) if metadata.is_directory || metadata.is_symlink => return Ok(None),
        Ok(_) => {}
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e),
    }

    match fs.read_file(path).await {
        Ok(data) => Ok(Some(FileDigest {
            fingerprint: fingerprint(&data),
            size: data.len() as u64,
        })),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
