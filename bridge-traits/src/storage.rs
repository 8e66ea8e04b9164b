//! Local File System Abstraction
//!
//! Provides a platform-agnostic trait for the file I/O the sync pipeline needs:
//! reading content to fingerprint and upload, writing downloaded blobs, and
//! walking the watched folder to build the startup snapshot.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
    /// The path itself is a symlink; the other fields describe its target
    pub is_symlink: bool,
}

/// File system access trait
///
/// All paths are absolute. Callers join relative item paths onto the watched
/// root before calling in.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn fingerprint_source(fs: &dyn FileSystemAccess, root: &Path) -> Result<Bytes> {
///     fs.read_file(&root.join("docs/report.txt")).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it (and its parent directories) if needed
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Recursively list every regular file below `path`
    ///
    /// Symlinks and entries that disappear during the walk are skipped.
    async fn list_files_recursive(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![path.to_path_buf()];
        let mut first = true;

        while let Some(dir) = pending.pop() {
            let entries = match self.list_directory(&dir).await {
                Ok(entries) => entries,
                Err(e) if !first && e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            first = false;

            for entry in entries {
                let metadata = match self.metadata(&entry).await {
                    Ok(metadata) => metadata,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => return Err(e),
                };
                if metadata.is_symlink {
                    continue;
                }
                if metadata.is_directory {
                    pending.push(entry);
                } else {
                    files.push(entry);
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use mockall::mock;

    mock! {
        pub Fs {}

        #[async_trait]
        impl FileSystemAccess for Fs {
            async fn exists(&self, path: &Path) -> Result<bool>;
            async fn metadata(&self, path: &Path) -> Result<FileMetadata>;
            async fn create_dir_all(&self, path: &Path) -> Result<()>;
            async fn read_file(&self, path: &Path) -> Result<Bytes>;
            async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;
            async fn delete_file(&self, path: &Path) -> Result<()>;
            async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
            async fn list_files_recursive(&self, path: &Path) -> Result<Vec<PathBuf>>;
        }
    }

    fn entry(is_directory: bool) -> FileMetadata {
        FileMetadata {
            size: 0,
            created_at: None,
            modified_at: None,
            is_directory,
            is_symlink: false,
        }
    }

    struct Tree(MockFs);

    #[async_trait]
    impl FileSystemAccess for Tree {
        async fn exists(&self, path: &Path) -> Result<bool> {
            self.0.exists(path).await
        }
        async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
            self.0.metadata(path).await
        }
        async fn create_dir_all(&self, path: &Path) -> Result<()> {
            self.0.create_dir_all(path).await
        }
        async fn read_file(&self, path: &Path) -> Result<Bytes> {
            self.0.read_file(path).await
        }
        async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
            self.0.write_file(path, data).await
        }
        async fn delete_file(&self, path: &Path) -> Result<()> {
            self.0.delete_file(path).await
        }
        async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
            self.0.list_directory(path).await
        }
    }

    #[tokio::test]
    async fn test_list_files_recursive_walks_subdirectories() {
        let mut fs = MockFs::new();
        fs.expect_list_directory().returning(|dir| {
            Ok(match dir.to_str() {
                Some("/root") => vec![PathBuf::from("/root/b.txt"), PathBuf::from("/root/sub")],
                Some("/root/sub") => vec![PathBuf::from("/root/sub/a.txt")],
                _ => Vec::new(),
            })
        });
        fs.expect_metadata()
            .returning(|path| Ok(entry(path.extension().is_none())));

        let files = Tree(fs).list_files_recursive(Path::new("/root")).await.unwrap();

        assert_eq!(
            files,
            vec![PathBuf::from("/root/b.txt"), PathBuf::from("/root/sub/a.txt")]
        );
    }

    #[tokio::test]
    async fn test_list_files_recursive_skips_vanished_entries() {
        let mut fs = MockFs::new();
        fs.expect_list_directory().returning(|_| {
            Ok(vec![PathBuf::from("/root/a.txt"), PathBuf::from("/root/gone.txt")])
        });
        fs.expect_metadata().returning(|path| {
            if path.ends_with("gone.txt") {
                Err(BridgeError::Io(std::io::ErrorKind::NotFound.into()))
            } else {
                Ok(entry(false))
            }
        });

        let files = Tree(fs).list_files_recursive(Path::new("/root")).await.unwrap();

        assert_eq!(files, vec![PathBuf::from("/root/a.txt")]);
    }

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            created_at: Some(1234567890),
            modified_at: Some(1234567900),
            is_directory: false,
            is_symlink: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }
}
