//! Per-entry encryption of sensitive credential fields.
//!
//! Each entry's `password` and `notes` are encrypted under one fresh IV that
//! is stored base64-encoded on the entry itself, independent of the
//! vault-level IV. Metadata fields pass through untouched.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::crypto::engine::CryptoEngine;
use crate::crypto::params::CryptoParams;
use crate::crypto::{CryptoError, Result};
use crate::model::CredentialEntry;

/// Thin layer over [`CryptoEngine`] for one credential entry.
pub struct EntryCipher<'a> {
    engine: &'a CryptoEngine,
    params: &'a CryptoParams,
}

impl<'a> EntryCipher<'a> {
    pub fn new(engine: &'a CryptoEngine, params: &'a CryptoParams) -> Self {
        Self { engine, params }
    }

    /// Encrypts the sensitive fields of the entry under a fresh IV.
    pub fn encrypt(&self, entry: &CredentialEntry) -> Result<CredentialEntry> {
        let iv = CryptoEngine::make_random_iv(self.params);
        let password = self.engine.encrypt_string(&entry.password, &iv, self.params)?;
        let notes = self.engine.encrypt_string(&entry.notes, &iv, self.params)?;
        Ok(CredentialEntry {
            aes_iv: STANDARD.encode(&iv),
            password: STANDARD.encode(password),
            notes: STANDARD.encode(notes),
            ..entry.clone()
        })
    }

    /// Decrypts the sensitive fields of the entry.
    ///
    /// Undecodable base64 is reported as a wrong-password failure, the same
    /// as tampered ciphertext.
    pub fn decrypt(&self, entry: &CredentialEntry) -> Result<CredentialEntry> {
        let iv = decode(&entry.aes_iv)?;
        let password_ct = decode(&entry.password)?;
        let notes_ct = decode(&entry.notes)?;
        let password = self.engine.decrypt_string(&password_ct, &iv, self.params)?;
        let notes = self.engine.decrypt_string(&notes_ct, &iv, self.params)?;
        Ok(CredentialEntry {
            password,
            notes,
            ..entry.clone()
        })
    }
}

fn decode(field: &str) -> Result<Vec<u8>> {
    STANDARD.decode(field).map_err(|_| CryptoError::WrongPassword)
}
