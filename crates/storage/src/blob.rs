//! Named binary objects, used for rendered certificate documents.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::repository::StorageError;

/// Streaming handle over a stored blob.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the name is not a plain file name or the
    /// write fails.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Open a blob for streaming reads.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when nothing is stored under `name`.
    async fn open(&self, name: &str) -> Result<BlobReader, StorageError>;

    async fn exists(&self, name: &str) -> Result<bool, StorageError>;
}

fn check_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StorageError::Io(format!("invalid blob name: {name:?}")));
    }
    Ok(())
}

/// Blobs as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        check_name(name)?;
        Ok(self.root.join(name))
    }
}

fn io(e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound
    } else {
        StorageError::Io(e.to_string())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        // Write to a sibling first so readers never observe a partial file.
        let tmp = self.root.join(format!(".{name}.part"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        debug!(path = %path.display(), size = bytes.len(), "blob stored");
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<BlobReader, StorageError> {
        let path = self.path_for(name)?;
        let file = tokio::fs::File::open(&path).await.map_err(io)?;
        Ok(Box::new(file))
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_for(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }
}

/// Process-local blobs for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>,
}

impl InMemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Vec<u8>>>>, StorageError> {
        self.blobs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        check_name(name)?;
        self.blobs()?.insert(name.to_owned(), Arc::new(bytes));
        Ok(())
    }

    async fn open(&self, name: &str) -> Result<BlobReader, StorageError> {
        let bytes = self
            .blobs()?
            .get(name)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        Ok(Box::new(Cursor::new(bytes.as_ref().clone())))
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.blobs()?.contains_key(name))
    }
}
