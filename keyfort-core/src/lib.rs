//! keyfort core — encrypted credential vault engine.
//!
//! A user password is stretched into a master key which encrypts a
//! structured collection of login entries, persisted as one opaque document
//! through a pluggable [`storage::StorageBackend`]. Plaintext exists in
//! memory only while the vault is unlocked; the master key and decrypted
//! model are discarded on every locking transition.
//!
//! The pieces, leaves first:
//! - [`crypto::CryptoEngine`] derives the master key and runs the cipher
//! - [`crypto::EntryCipher`] encrypts the sensitive fields of one entry
//! - [`document::DocumentCodec`] converts and migrates wire documents
//! - [`store::CredentialStore`] is the state machine gluing it all together

pub mod crypto;
pub mod document;
pub mod model;
pub mod storage;
pub mod store;

pub use crypto::{
    CipherMode, CryptoDefaults, CryptoEngine, CryptoError, CryptoParams, EntryCipher, HashAlg,
    KeyDerivation,
};
pub use document::{
    DocumentCodec, DocumentError, VaultDocument, VaultSettings, CURRENT_DATA_VERSION,
};
pub use model::{starter_entries, CredentialEntry, VaultModel};
pub use storage::{StorageBackend, StorageError};
pub use store::{CredentialStore, ListenerHandle, StateListener, VaultState};

use thiserror::Error;

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Top-level error for vault operations.
///
/// Every failure carries a stable machine-readable [`VaultError::code`] and
/// a human-readable `Display` message; backend-specific codes pass through
/// unchanged.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("password is empty")]
    EmptyPassword,

    #[error("entry not found in database")]
    EntryNotFound,

    #[error("another operation is in progress")]
    OperationInProgress,
}

impl VaultError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            VaultError::Crypto(e) => e.code(),
            VaultError::Document(e) => e.code(),
            VaultError::Storage(e) => e.code(),
            VaultError::InvalidState(_) => "db/invalid-state",
            VaultError::EmptyPassword => "db/invalid-password",
            VaultError::EntryNotFound => "db/entry-not-found",
            VaultError::OperationInProgress => "db/operation-in-progress",
        }
    }
}
