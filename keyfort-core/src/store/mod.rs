//! Vault orchestration: the credential store state machine.
//!
//! One [`CredentialStore`] instance owns the state for one vault session and
//! glues together the storage backend, the cryptographic engine and the
//! document codec. Plaintext entries exist only while the state is
//! [`VaultState::Unlocked`]; every locking transition zeroizes the model and
//! overwrites the master key.

mod data;
#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroize;

use crate::crypto::engine::CryptoEngine;
use crate::crypto::entry_cipher::EntryCipher;
use crate::crypto::params::{CryptoDefaults, CryptoParams};
use crate::crypto::CryptoError;
use crate::document::{DocumentCodec, VaultDocument};
use crate::model::{starter_entries, CredentialEntry, VaultModel};
use crate::storage::StorageBackend;
use crate::{Result, VaultError};
use data::VaultData;

/// Lifecycle state of a credential store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VaultState {
    /// Initial state before fetching for the first time.
    Initial,
    /// The document is currently being fetched.
    Fetching,
    /// No document exists yet on the storage backend.
    Missing,
    /// The document was downloaded and is locked (encrypted).
    Locked,
    /// The document was downloaded and unlocked (decrypted).
    Unlocked,
}

/// Callback observing state transitions.
pub type StateListener = Box<dyn Fn(VaultState) + Send + Sync>;

/// Token returned by [`CredentialStore::add_state_listener`], used to remove
/// the listener again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// Rejects overlapping state-changing operations on one store instance.
///
/// The flag is released when the guard drops, including when an operation's
/// future is dropped mid-flight.
#[derive(Debug)]
struct OpGuard(Arc<AtomicBool>);

impl OpGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(VaultError::OperationInProgress);
        }
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The main vault API gluing together storage, crypto and data.
pub struct CredentialStore<S> {
    state: VaultState,
    listeners: Vec<(u64, StateListener)>,
    next_listener_id: u64,
    crypto: CryptoEngine,
    codec: DocumentCodec,
    defaults: CryptoDefaults,
    data: VaultData,
    storage: S,
    op_flag: Arc<AtomicBool>,
}

impl<S: StorageBackend> CredentialStore<S> {
    /// Creates a store over the given backend with the production parameter
    /// defaults.
    pub fn new(storage: S) -> Self {
        Self::with_defaults(storage, CryptoDefaults::default())
    }

    /// Creates a store with an explicit parameter generation table.
    pub fn with_defaults(storage: S, defaults: CryptoDefaults) -> Self {
        Self {
            state: VaultState::Initial,
            listeners: Vec::new(),
            next_listener_id: 0,
            crypto: CryptoEngine::new(),
            codec: DocumentCodec::new(defaults.clone()),
            defaults,
            data: VaultData::new(),
            storage,
            op_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resets crypto, data and state back to [`VaultState::Initial`].
    /// Previously installed listeners stay registered.
    pub fn reset(&mut self) {
        debug!("reset");
        self.data.clear_model();
        self.crypto.clear_master_key();
        self.data = VaultData::new();
        self.crypto = CryptoEngine::new();
        self.set_state(VaultState::Initial);
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// The decrypted model; fails unless the vault is unlocked.
    pub fn model(&self) -> Result<&VaultModel> {
        self.data.model()
    }

    /// The wire document for the current settings and payload.
    pub fn document(&self) -> Result<VaultDocument> {
        self.data.document(&self.codec)
    }

    /// The crypto parameters of the loaded document.
    pub fn crypto_params(&self) -> Result<&CryptoParams> {
        self.data.crypto_params()
    }

    /// True when the loaded document uses parameters older than the current
    /// defaults, i.e. an upgrade should be offered.
    pub fn is_upgrade_suggested(&self) -> bool {
        self.data
            .crypto_params()
            .map(|params| *params != self.defaults.current)
            .unwrap_or(false)
    }

    /// Registers a state listener. The callback fires once immediately with
    /// the current state, then on every transition.
    pub fn add_state_listener(&mut self, listener: StateListener) -> ListenerHandle {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        listener(self.state);
        self.listeners.push((id, listener));
        ListenerHandle(id)
    }

    /// Removes a previously registered state listener.
    pub fn remove_state_listener(&mut self, handle: ListenerHandle) {
        self.listeners.retain(|(id, _)| *id != handle.0);
    }

    /// Attempts to download the document from the storage backend.
    ///
    /// Transitions through [`VaultState::Fetching`] to
    /// [`VaultState::Missing`] (no document), [`VaultState::Locked`] (no
    /// resident key) or [`VaultState::Unlocked`] (key already resident, e.g.
    /// a periodic refresh while unlocked). Decode failures are surfaced to
    /// the caller and leave the store requiring a restart.
    pub async fn download(&mut self) -> Result<()> {
        let _guard = OpGuard::acquire(&self.op_flag)?;
        debug!("download");
        self.set_state(VaultState::Fetching);
        match self.storage.download().await? {
            None => {
                self.set_state(VaultState::Missing);
                Ok(())
            }
            Some(document) => self.assign_document(&document),
        }
    }

    /// Creates a new vault protected by `password`, seeded with the starter
    /// entries, and uploads it. Only valid while the document is missing.
    /// Ends unlocked.
    pub async fn create(&mut self, password: &str) -> Result<()> {
        let _guard = OpGuard::acquire(&self.op_flag)?;
        debug!("create");
        if self.state != VaultState::Missing {
            return Err(VaultError::InvalidState("database must be missing".into()));
        }

        let params = self.defaults.current.clone();
        let salt = CryptoEngine::make_random_salt();
        let iv = CryptoEngine::make_random_iv(&params);
        self.crypto.set_master_key(password, &salt, &params)?;
        self.data.create_new(salt.to_vec(), iv.clone(), params.clone());

        for entry in starter_entries() {
            let encrypted = EntryCipher::new(&self.crypto, &params).encrypt(&entry)?;
            self.data.apply_entry_change(None, Some(encrypted))?;
        }

        self.upload_database(iv).await?;
        // Decrypt what was just uploaded to confirm consistency.
        self.decrypt_database()
    }

    /// Unlocks a locked vault, deriving the key with the document's own
    /// parameters. A wrong password re-locks the store before the error is
    /// surfaced.
    pub async fn unlock(&mut self, password: &str) -> Result<()> {
        let _guard = OpGuard::acquire(&self.op_flag)?;
        debug!("unlock");
        if self.state != VaultState::Locked {
            return Err(VaultError::InvalidState("database must be locked".into()));
        }
        self.unlock_internal(password)
    }

    /// Locks the vault: zeroizes the model, overwrites the master key and
    /// transitions to [`VaultState::Locked`]. No-op in any other state.
    pub fn lock(&mut self) {
        if self.state != VaultState::Unlocked {
            return;
        }
        debug!("lock");
        self.force_lock();
    }

    /// Encrypts the current model under a fresh IV and the document's
    /// existing parameters, then uploads the document.
    pub async fn upload(&mut self) -> Result<()> {
        let _guard = OpGuard::acquire(&self.op_flag)?;
        debug!("upload");
        let params = self.data.crypto_params()?;
        let iv = CryptoEngine::make_random_iv(params);
        self.upload_database(iv).await
    }

    /// Adds an encrypted entry to the model and returns its identifier.
    /// In-memory only; callers persist with [`CredentialStore::upload`].
    pub fn add_entry(&mut self, entry: CredentialEntry) -> Result<String> {
        debug!("add_entry");
        let id = entry.id.clone();
        self.data.apply_entry_change(None, Some(entry))?;
        Ok(id)
    }

    /// Replaces the entry with the given identifier.
    pub fn update_entry(&mut self, id: &str, mut entry: CredentialEntry) -> Result<()> {
        debug!("update_entry");
        entry.id = id.to_string();
        self.data.apply_entry_change(Some(id), Some(entry))
    }

    /// Deletes the entry with the given identifier.
    pub fn delete_entry(&mut self, id: &str) -> Result<()> {
        debug!("delete_entry");
        self.data.apply_entry_change(Some(id), None)
    }

    /// Sorts the model's entries by name.
    pub fn sort_entries(&mut self) -> Result<()> {
        debug!("sort_entries");
        self.data.sort_entries()
    }

    /// Encrypts one entry's sensitive fields under the document's
    /// parameters.
    pub fn encrypt_entry(&self, entry: &CredentialEntry) -> Result<CredentialEntry> {
        let params = self.data.crypto_params()?;
        Ok(EntryCipher::new(&self.crypto, params).encrypt(entry)?)
    }

    /// Decrypts one entry's sensitive fields under the document's
    /// parameters.
    pub fn decrypt_entry(&self, entry: &CredentialEntry) -> Result<CredentialEntry> {
        let params = self.data.crypto_params()?;
        Ok(EntryCipher::new(&self.crypto, params).decrypt(entry)?)
    }

    /// Re-encrypts the whole vault under a new password, keeping the
    /// document's existing parameters. Requires the locked state; ends
    /// unlocked with the rewritten model resident. Callers persist with
    /// [`CredentialStore::upload`].
    pub async fn change_password(&mut self, old_password: &str, new_password: &str) -> Result<()> {
        let _guard = OpGuard::acquire(&self.op_flag)?;
        debug!("change_password");
        let params = self.data.crypto_params()?.clone();
        self.convert_database(old_password, new_password, params)
    }

    /// Re-encrypts the whole vault under the current default parameters,
    /// keeping the same password. Requires the locked state; ends unlocked.
    pub async fn upgrade_crypto_params(&mut self, password: &str) -> Result<()> {
        let _guard = OpGuard::acquire(&self.op_flag)?;
        debug!("upgrade_crypto_params");
        let params = self.defaults.current.clone();
        self.convert_database(password, password, params)
    }

    /// Rewrites the vault under a new salt, IV, password and parameter set.
    ///
    /// All-or-nothing: any failure after the unlock forces the store back to
    /// locked with key and model cleared, so it never holds a mix of old-
    /// and new-key ciphertexts.
    fn convert_database(
        &mut self,
        old_password: &str,
        new_password: &str,
        new_params: CryptoParams,
    ) -> Result<()> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(VaultError::EmptyPassword);
        }
        if self.state == VaultState::Unlocked {
            return Err(VaultError::InvalidState("database must be locked".into()));
        }
        if self.state != VaultState::Locked {
            return Err(VaultError::InvalidState("database unavailable".into()));
        }

        // Decrypt the vault with the parameters in the document.
        self.unlock_internal(old_password)?;

        let result = self.rewrite_unlocked(new_password, &new_params);
        if result.is_err() {
            self.force_lock();
        }
        result
    }

    fn rewrite_unlocked(&mut self, new_password: &str, new_params: &CryptoParams) -> Result<()> {
        let old_params = self.data.crypto_params()?.clone();

        let mut decrypted: Vec<CredentialEntry> = {
            let cipher = EntryCipher::new(&self.crypto, &old_params);
            self.data
                .model()?
                .entries
                .iter()
                .map(|entry| cipher.decrypt(entry))
                .collect::<std::result::Result<_, _>>()?
        };

        let salt = CryptoEngine::make_random_salt();
        let iv = CryptoEngine::make_random_iv(new_params);
        self.crypto.set_master_key(new_password, &salt, new_params)?;

        let encrypted: Vec<CredentialEntry> = {
            let cipher = EntryCipher::new(&self.crypto, new_params);
            decrypted
                .iter()
                .map(|entry| cipher.encrypt(entry))
                .collect::<std::result::Result<_, _>>()?
        };
        decrypted.zeroize();

        self.data.create_new(salt.to_vec(), iv, new_params.clone());
        self.data.set_model(VaultModel { entries: encrypted });
        Ok(())
    }

    fn assign_document(&mut self, document: &VaultDocument) -> Result<()> {
        self.data.set_document(&self.codec, document)?;
        if self.crypto.has_master_key() {
            self.decrypt_database()
        } else {
            self.set_state(VaultState::Locked);
            Ok(())
        }
    }

    fn unlock_internal(&mut self, password: &str) -> Result<()> {
        let salt = self.data.pass_salt()?.to_vec();
        let params = self.data.crypto_params()?.clone();
        self.crypto.set_master_key(password, &salt, &params)?;
        self.decrypt_database()
    }

    /// Decrypts the payload into the model. On any failure the store is
    /// forced back to locked, clearing key and partial state, before the
    /// error is re-raised.
    fn decrypt_database(&mut self) -> Result<()> {
        let params = self.data.crypto_params()?.clone();
        let iv = self.data.aes_iv()?.to_vec();
        let payload = self.data.payload()?.to_vec();

        let plaintext = match self.crypto.decrypt_raw(&payload, &iv, &params) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                self.force_lock();
                return Err(error.into());
            }
        };
        let model: VaultModel = match serde_json::from_slice(&plaintext) {
            Ok(model) => model,
            Err(_) => {
                // Garbage output from a wrong key under the legacy mode.
                self.force_lock();
                return Err(CryptoError::WrongPassword.into());
            }
        };

        self.data.set_model(model);
        self.set_state(VaultState::Unlocked);
        Ok(())
    }

    async fn upload_database(&mut self, iv: Vec<u8>) -> Result<()> {
        let params = self.data.crypto_params()?.clone();
        let plaintext =
            serde_json::to_vec(self.data.model()?).map_err(|_| CryptoError::EncryptFailed)?;
        let ciphertext = self.crypto.encrypt_raw(&plaintext, &iv, &params)?;
        self.data.set_payload(ciphertext, iv)?;
        let document = self.data.document(&self.codec)?;
        self.storage.upload(&document).await?;
        Ok(())
    }

    fn force_lock(&mut self) {
        self.data.clear_model();
        self.crypto.clear_master_key();
        self.set_state(VaultState::Locked);
    }

    fn set_state(&mut self, state: VaultState) {
        if self.state == state {
            return;
        }
        self.state = state;
        debug!(state = ?state, "state changed");
        for (_, listener) in &self.listeners {
            listener(state);
        }
    }
}
