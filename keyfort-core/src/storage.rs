//! Storage backend boundary.
//!
//! The engine never talks to a concrete provider; it depends on this trait.
//! Backends store and return the document verbatim and must not interpret
//! its `settings`/`payload` fields.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::VaultDocument;

/// Errors surfaced by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The identity or session required by the backend is absent.
    #[error("not authenticated with the storage backend")]
    NotAuthenticated,

    /// A provider-specific failure; `code` is passed through unchanged.
    #[error("{message}")]
    Backend { code: String, message: String },
}

impl StorageError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            StorageError::NotAuthenticated => "storage/not-authenticated",
            StorageError::Backend { code, .. } => code,
        }
    }
}

/// Remote or local persistence for one vault document.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Downloads the vault document.
    ///
    /// Returns `Ok(None)` if no document exists yet (new user); absence is
    /// an expected outcome, never an error.
    async fn download(&self) -> Result<Option<VaultDocument>, StorageError>;

    /// Uploads the vault document, replacing any previous one.
    async fn upload(&self, document: &VaultDocument) -> Result<(), StorageError>;
}
