//! In-memory vault data: settings, encrypted payload, decrypted model.
//!
//! Mutations follow a copy-on-write rule: entry changes build a new entries
//! vector from a snapshot and swap it in whole, so no caller ever observes a
//! half-updated model.

use zeroize::Zeroize;

use crate::crypto::params::CryptoParams;
use crate::document::{DocumentCodec, VaultDocument, VaultSettings, CURRENT_DATA_VERSION};
use crate::model::{CredentialEntry, VaultModel};
use crate::{Result, VaultError};

pub(super) struct VaultData {
    /// The encrypted payload, as last downloaded or encrypted.
    payload: Option<Vec<u8>>,
    /// Decoded document settings.
    settings: Option<VaultSettings>,
    /// The decrypted model; present only while the vault is unlocked.
    model: Option<VaultModel>,
}

impl VaultData {
    pub fn new() -> Self {
        Self {
            payload: None,
            settings: None,
            model: None,
        }
    }

    /// Returns the decrypted model.
    pub fn model(&self) -> Result<&VaultModel> {
        self.model
            .as_ref()
            .ok_or_else(|| VaultError::InvalidState("model not initialized".into()))
    }

    /// Sets the decrypted model, e.g. after unlocking.
    pub fn set_model(&mut self, model: VaultModel) {
        self.model = Some(model);
    }

    /// Zeroizes and discards all decrypted data, e.g. on lock.
    pub fn clear_model(&mut self) {
        if let Some(mut model) = self.model.take() {
            model.zeroize();
        }
    }

    /// Decodes and installs a downloaded document.
    pub fn set_document(&mut self, codec: &DocumentCodec, document: &VaultDocument) -> Result<()> {
        let (settings, payload) = codec.decode(document)?;
        self.settings = Some(settings);
        self.payload = Some(payload);
        Ok(())
    }

    /// Encodes the current settings and payload for upload.
    pub fn document(&self, codec: &DocumentCodec) -> Result<VaultDocument> {
        let settings = self.settings()?;
        let payload = self.payload()?;
        Ok(codec.encode(settings, payload))
    }

    /// Replaces the encrypted payload and its IV after a local change.
    pub fn set_payload(&mut self, payload: Vec<u8>, aes_iv: Vec<u8>) -> Result<()> {
        let settings = self
            .settings
            .as_mut()
            .ok_or_else(|| VaultError::InvalidState("settings not initialized".into()))?;
        settings.aes_iv = aes_iv;
        self.payload = Some(payload);
        Ok(())
    }

    pub fn payload(&self) -> Result<&[u8]> {
        self.payload
            .as_deref()
            .ok_or_else(|| VaultError::InvalidState("payload not initialized".into()))
    }

    pub fn settings(&self) -> Result<&VaultSettings> {
        self.settings
            .as_ref()
            .ok_or_else(|| VaultError::InvalidState("settings not initialized".into()))
    }

    pub fn pass_salt(&self) -> Result<&[u8]> {
        Ok(&self.settings()?.pass_salt)
    }

    pub fn aes_iv(&self) -> Result<&[u8]> {
        Ok(&self.settings()?.aes_iv)
    }

    pub fn crypto_params(&self) -> Result<&CryptoParams> {
        Ok(&self.settings()?.crypto_params)
    }

    /// Installs fresh settings and an empty model for a new or rewritten
    /// vault. The previous model, if any, is zeroized.
    pub fn create_new(&mut self, pass_salt: Vec<u8>, aes_iv: Vec<u8>, params: CryptoParams) {
        self.clear_model();
        self.settings = Some(VaultSettings {
            crypto_params: params,
            pass_salt,
            aes_iv,
            data_version: CURRENT_DATA_VERSION,
        });
        self.payload = None;
        self.model = Some(VaultModel::default());
    }

    /// Applies one entry change to a copy-on-write snapshot of the entries.
    ///
    /// `old_id == None` adds, `new_entry == None` deletes, both present
    /// replaces. Passing neither is a programming-contract violation, which
    /// the store's typed API makes unrepresentable.
    pub fn apply_entry_change(
        &mut self,
        old_id: Option<&str>,
        new_entry: Option<CredentialEntry>,
    ) -> Result<()> {
        debug_assert!(old_id.is_some() || new_entry.is_some());
        let model = self.model()?;

        let mut entries = model.entries.clone();
        match old_id {
            None => {
                if let Some(entry) = new_entry {
                    entries.push(entry);
                }
            }
            Some(id) => {
                let index = entries
                    .iter()
                    .position(|e| e.id == id)
                    .ok_or(VaultError::EntryNotFound)?;
                match new_entry {
                    None => {
                        entries.remove(index);
                    }
                    Some(entry) => entries[index] = entry,
                }
            }
        }

        self.model = Some(VaultModel { entries });
        Ok(())
    }

    /// Sorts entries by name, case-insensitively, keeping ties stable.
    pub fn sort_entries(&mut self) -> Result<()> {
        let model = self.model()?;
        let mut entries = model.entries.clone();
        entries.sort_by_key(|e| e.name.to_lowercase());
        self.model = Some(VaultModel { entries });
        Ok(())
    }
}
