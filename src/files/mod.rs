//! Server-side file storage for LIST/GET/PUT
//!
//! All file operations are confined to a single configured root directory.
//! PUT stores under the basename of the client-supplied name, so an uploaded
//! path can never escape the root.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

/// File store errors
#[derive(Error, Debug)]
pub enum FileStoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

/// A directory of shared files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate the root's immediate entries as a newline-joined list, in
    /// host enumeration order (not sorted).
    pub async fn list(&self) -> FileStoreResult<String> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names.join("\n"))
    }

    /// Read a shared file's full contents.
    pub async fn read(&self, name: &str) -> FileStoreResult<Vec<u8>> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store `data` under the basename of `name`, unconditionally overwriting
    /// any existing file. No append, no versioning.
    pub async fn write(&self, name: &str, data: &[u8]) -> FileStoreResult<PathBuf> {
        let path = self.resolve(name)?;
        fs::write(&path, data).await?;
        Ok(path)
    }

    fn resolve(&self, name: &str) -> FileStoreResult<PathBuf> {
        let basename = Path::new(name)
            .file_name()
            .ok_or_else(|| FileStoreError::InvalidName(name.to_string()))?;
        Ok(self.root.join(basename))
    }
}
