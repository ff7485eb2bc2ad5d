//! Local single-file storage backend.
//!
//! Persists the vault document as one JSON file. The document's `settings`
//! and `payload` fields pass through untouched; this backend only handles
//! the transport encoding of the wrapper.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use keyfort_core::{StorageBackend, StorageError, VaultDocument};

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn download(&self) -> Result<Option<VaultDocument>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error("reading vault file", error)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            StorageError::Backend {
                code: "storage/corrupt-file".into(),
                message: format!("vault file is not a valid document: {error}"),
            }
        })
    }

    async fn upload(&self, document: &VaultDocument) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(document).map_err(|error| StorageError::Backend {
            code: "storage/encode-failed".into(),
            message: format!("failed to encode document: {error}"),
        })?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|error| io_error("writing vault file", error))
    }
}

fn io_error(context: &str, error: std::io::Error) -> StorageError {
    StorageError::Backend {
        code: "storage/io".into(),
        message: format!("{context}: {error}"),
    }
}
