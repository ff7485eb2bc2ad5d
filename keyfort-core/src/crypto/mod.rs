//! Cryptographic layer of the vault engine.
//!
//! This module provides:
//! - PBKDF2-SHA-256 master key derivation with versioned parameters
//! - AES-256-CBC (legacy) and AES-256-GCM (current) payload encryption
//! - per-entry encryption of sensitive credential fields
//! - zeroization of key material on lock

pub mod engine;
pub mod entry_cipher;
pub mod params;

pub use engine::{CryptoEngine, MasterKey};
pub use entry_cipher::EntryCipher;
pub use params::{CipherMode, CryptoDefaults, CryptoParams, HashAlg, KeyDerivation};

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
///
/// Decryption and authentication failures are reported uniformly as
/// [`CryptoError::WrongPassword`]; a corrupt buffer is indistinguishable from
/// a bad password on purpose.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("password must not be empty")]
    EmptyPassword,

    #[error("password salt must be {expected} bytes, got {got}")]
    InvalidSalt { expected: usize, got: usize },

    #[error("key derivation failed")]
    DeriveKeyFailed,

    #[error("no master key present")]
    NoMasterKey,

    #[error("initialization vector must be {expected} bytes for {mode}, got {got}")]
    InvalidIv {
        mode: CipherMode,
        expected: usize,
        got: usize,
    },

    #[error("encrypting data failed")]
    EncryptFailed,

    #[error("wrong password or corrupted data")]
    WrongPassword,
}

impl CryptoError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::EmptyPassword => "crypto/empty-password",
            CryptoError::InvalidSalt { .. } => "crypto/invalid-salt",
            CryptoError::DeriveKeyFailed => "crypto/derive-key-failed",
            CryptoError::NoMasterKey => "crypto/no-master-key",
            CryptoError::InvalidIv { .. } => "crypto/invalid-iv",
            CryptoError::EncryptFailed => "crypto/encrypt-failed",
            CryptoError::WrongPassword => "crypto/wrong-password",
        }
    }
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
