use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CredentialStore, OpGuard, VaultState};
use crate::crypto::params::{CipherMode, CryptoDefaults, CryptoParams, HashAlg, KeyDerivation};
use crate::document::{VaultDocument, CURRENT_DATA_VERSION};
use crate::model::CredentialEntry;
use crate::storage::{StorageBackend, StorageError};

/// Keeps the last uploaded document in memory, shared between store
/// instances so tests can simulate separate sessions over one backend.
#[derive(Clone, Default)]
struct MemoryStorage {
    document: Arc<Mutex<Option<VaultDocument>>>,
}

impl MemoryStorage {
    fn stored(&self) -> Option<VaultDocument> {
        self.document.lock().unwrap().clone()
    }

    fn replace(&self, document: Option<VaultDocument>) {
        *self.document.lock().unwrap() = document;
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn download(&self) -> Result<Option<VaultDocument>, StorageError> {
        Ok(self.stored())
    }

    async fn upload(&self, document: &VaultDocument) -> Result<(), StorageError> {
        self.replace(Some(document.clone()));
        Ok(())
    }
}

/// Reduced iteration counts keep the tests fast; the parameter table is
/// injectable for exactly this reason.
fn test_defaults() -> CryptoDefaults {
    CryptoDefaults {
        legacy: CryptoParams {
            derive_algo: KeyDerivation::Pbkdf2,
            hash_algo: HashAlg::Sha256,
            cipher_mode: CipherMode::AesCbc,
            iterations: 2048,
        },
        current: CryptoParams {
            derive_algo: KeyDerivation::Pbkdf2,
            hash_algo: HashAlg::Sha256,
            cipher_mode: CipherMode::AesGcm,
            iterations: 4096,
        },
    }
}

/// A defaults table stuck on the legacy generation, used to author vaults
/// that look like they were written by the first release.
fn legacy_only_defaults() -> CryptoDefaults {
    let defaults = test_defaults();
    CryptoDefaults {
        legacy: defaults.legacy.clone(),
        current: defaults.legacy,
    }
}

fn new_store() -> (CredentialStore<MemoryStorage>, MemoryStorage) {
    let storage = MemoryStorage::default();
    let store = CredentialStore::with_defaults(storage.clone(), test_defaults());
    (store, storage)
}

async fn created_store(password: &str) -> (CredentialStore<MemoryStorage>, MemoryStorage) {
    let (mut store, storage) = new_store();
    store.download().await.unwrap();
    store.create(password).await.unwrap();
    (store, storage)
}

fn entry_named(name: &str) -> CredentialEntry {
    CredentialEntry {
        name: name.into(),
        url: format!("https://{}.example.com", name.to_lowercase()),
        email: "user@example.com".into(),
        password: "secret".into(),
        ..CredentialEntry::new()
    }
}

fn decrypted_secrets(store: &CredentialStore<MemoryStorage>) -> Vec<(String, String, String)> {
    store
        .model()
        .unwrap()
        .entries
        .iter()
        .map(|entry| {
            let decrypted = store.decrypt_entry(entry).unwrap();
            (decrypted.name, decrypted.password, decrypted.notes)
        })
        .collect()
}

#[tokio::test]
async fn test_download_missing() {
    let (mut store, _storage) = new_store();
    assert_eq!(store.state(), VaultState::Initial);
    store.download().await.unwrap();
    assert_eq!(store.state(), VaultState::Missing);
}

#[tokio::test]
async fn test_create_unlock_scenario() {
    let (mut store, storage) = created_store("p@ss1").await;
    assert_eq!(store.state(), VaultState::Unlocked);

    let names: Vec<_> = store
        .model()
        .unwrap()
        .entries
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names, ["Amazon", "E-Bay", "Gmail"]);

    // Sensitive fields stay encrypted inside the decrypted model.
    let amazon = store.model().unwrap().entries[0].clone();
    assert_ne!(amazon.password, "pass123");
    assert!(!amazon.aes_iv.is_empty());
    assert_eq!(store.decrypt_entry(&amazon).unwrap().password, "pass123");

    // The created document was persisted at the current schema version.
    let stored = storage.stored().unwrap();
    assert_eq!(stored.settings.data_version, CURRENT_DATA_VERSION);

    store.lock();
    assert_eq!(store.state(), VaultState::Locked);
    assert!(store.model().is_err());

    let err = store.unlock("wrong").await.unwrap_err();
    assert_eq!(err.code(), "crypto/wrong-password");
    assert_eq!(store.state(), VaultState::Locked);

    store.unlock("p@ss1").await.unwrap();
    assert_eq!(store.state(), VaultState::Unlocked);
    let names_after: Vec<_> = store
        .model()
        .unwrap()
        .entries
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names_after, ["Amazon", "E-Bay", "Gmail"]);
    assert_eq!(
        store
            .decrypt_entry(&store.model().unwrap().entries[1])
            .unwrap()
            .notes,
        "Never buy from user bigcheat16 again!"
    );
}

#[tokio::test]
async fn test_create_requires_missing_state() {
    let (mut store, _storage) = new_store();
    // Never downloaded: still Initial.
    let err = store.create("p@ss1").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-state");

    store.download().await.unwrap();
    store.create("p@ss1").await.unwrap();

    // Already created: Unlocked.
    let err = store.create("p@ss1").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-state");
}

#[tokio::test]
async fn test_create_on_locked_store_does_not_mutate() {
    let (_store, storage) = created_store("p@ss1").await;

    let mut other = CredentialStore::with_defaults(storage.clone(), test_defaults());
    other.download().await.unwrap();
    assert_eq!(other.state(), VaultState::Locked);

    let before = storage.stored().unwrap();
    let err = other.create("other-pass").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-state");
    assert_eq!(other.state(), VaultState::Locked);
    assert!(other.model().is_err());
    assert_eq!(storage.stored().unwrap(), before);
}

#[tokio::test]
async fn test_unlock_requires_locked_state() {
    let (mut store, _storage) = new_store();
    store.download().await.unwrap();
    assert_eq!(store.state(), VaultState::Missing);
    let err = store.unlock("p@ss1").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-state");
}

#[tokio::test]
async fn test_add_then_delete_restores_model() {
    let (mut store, _storage) = created_store("p@ss1").await;
    let before: Vec<_> = store.model().unwrap().entries.clone();

    let encrypted = store.encrypt_entry(&entry_named("Zoo")).unwrap();
    let id = store.add_entry(encrypted).unwrap();
    assert_eq!(store.model().unwrap().entries.len(), before.len() + 1);

    store.delete_entry(&id).unwrap();
    assert_eq!(store.model().unwrap().entries, before);

    // A stale reference no longer resolves.
    let err = store.delete_entry(&id).unwrap_err();
    assert_eq!(err.code(), "db/entry-not-found");
}

#[tokio::test]
async fn test_update_entry_keeps_identity() {
    let (mut store, _storage) = created_store("p@ss1").await;
    let original = store.model().unwrap().entries[0].clone();

    let mut changed = store
        .decrypt_entry(&original)
        .and_then(|mut e| {
            e.name = "Amazon Prime".into();
            e.password = "pass456".into();
            store.encrypt_entry(&e)
        })
        .unwrap();
    changed.id = "ignored".into();
    store.update_entry(&original.id, changed).unwrap();

    let updated = store.model().unwrap().entry(&original.id).unwrap().clone();
    assert_eq!(updated.name, "Amazon Prime");
    assert_eq!(updated.id, original.id);
    assert_eq!(store.decrypt_entry(&updated).unwrap().password, "pass456");

    let err = store
        .update_entry("unknown-id", entry_named("Nope"))
        .unwrap_err();
    assert_eq!(err.code(), "db/entry-not-found");
}

#[tokio::test]
async fn test_sort_entries_by_name() {
    let (mut store, _storage) = created_store("p@ss1").await;
    let encrypted = store.encrypt_entry(&entry_named("aardvark")).unwrap();
    store.add_entry(encrypted).unwrap();

    store.sort_entries().unwrap();
    let names: Vec<_> = store
        .model()
        .unwrap()
        .entries
        .iter()
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(names, ["aardvark", "Amazon", "E-Bay", "Gmail"]);
}

#[tokio::test]
async fn test_redownload_while_unlocked_stays_unlocked() {
    let (mut store, _storage) = created_store("p@ss1").await;

    let encrypted = store.encrypt_entry(&entry_named("Zoo")).unwrap();
    store.add_entry(encrypted).unwrap();
    store.upload().await.unwrap();

    // A periodic refresh while the key is resident decrypts immediately.
    store.download().await.unwrap();
    assert_eq!(store.state(), VaultState::Unlocked);
    assert!(store
        .model()
        .unwrap()
        .entries
        .iter()
        .any(|e| e.name == "Zoo"));
}

#[tokio::test]
async fn test_change_password_invariant() {
    let (mut store, _storage) = created_store("old-pass").await;
    let before = decrypted_secrets(&store);

    store.lock();
    store.change_password("old-pass", "new-pass").await.unwrap();
    assert_eq!(store.state(), VaultState::Unlocked);
    store.upload().await.unwrap();
    store.lock();

    let err = store.unlock("old-pass").await.unwrap_err();
    assert_eq!(err.code(), "crypto/wrong-password");
    assert_eq!(store.state(), VaultState::Locked);

    store.unlock("new-pass").await.unwrap();
    assert_eq!(decrypted_secrets(&store), before);
}

#[tokio::test]
async fn test_change_password_requires_locked_state() {
    let (mut store, _storage) = created_store("p@ss1").await;

    let err = store.change_password("p@ss1", "other").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-state");

    store.lock();
    let err = store.change_password("", "other").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-password");
    let err = store.change_password("p@ss1", "").await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-password");
}

#[tokio::test]
async fn test_change_password_failure_leaves_store_locked() {
    let (mut store, storage) = created_store("p@ss1").await;
    store.lock();

    let before = storage.stored().unwrap();
    let err = store.change_password("wrong", "new-pass").await.unwrap_err();
    assert_eq!(err.code(), "crypto/wrong-password");
    assert_eq!(store.state(), VaultState::Locked);
    assert!(store.model().is_err());
    // Nothing was persisted by the failed conversion.
    assert_eq!(storage.stored().unwrap(), before);

    // The old password still opens the vault.
    store.unlock("p@ss1").await.unwrap();
}

/// Authors a vault with the legacy generation, then rewrites its document to
/// look like a version 1 file from before crypto parameters existed.
async fn seed_legacy_v1_vault(password: &str) -> MemoryStorage {
    let storage = MemoryStorage::default();
    let mut author = CredentialStore::with_defaults(storage.clone(), legacy_only_defaults());
    author.download().await.unwrap();
    author.create(password).await.unwrap();

    let mut document = storage.stored().unwrap();
    document.settings.crypto_params = None;
    document.settings.data_version = 1;
    storage.replace(Some(document));
    storage
}

#[tokio::test]
async fn test_legacy_vault_unlocks_with_document_params() {
    let storage = seed_legacy_v1_vault("p@ss1").await;
    let mut store = CredentialStore::with_defaults(storage, test_defaults());

    store.download().await.unwrap();
    assert_eq!(store.state(), VaultState::Locked);
    // Migration filled in the legacy parameter set.
    let params = store.crypto_params().unwrap();
    assert_eq!(params.cipher_mode, CipherMode::AesCbc);
    assert_eq!(params.iterations, 2048);
    assert!(store.is_upgrade_suggested());

    let err = store.unlock("wrong").await.unwrap_err();
    assert_eq!(err.code(), "crypto/wrong-password");
    assert_eq!(store.state(), VaultState::Locked);

    store.unlock("p@ss1").await.unwrap();
    assert_eq!(store.state(), VaultState::Unlocked);
}

#[tokio::test]
async fn test_upgrade_crypto_params_invariant() {
    let storage = seed_legacy_v1_vault("p@ss1").await;
    let mut store = CredentialStore::with_defaults(storage.clone(), test_defaults());
    store.download().await.unwrap();

    store.unlock("p@ss1").await.unwrap();
    let before = decrypted_secrets(&store);
    store.lock();

    store.upgrade_crypto_params("p@ss1").await.unwrap();
    assert_eq!(store.state(), VaultState::Unlocked);
    assert_eq!(store.crypto_params().unwrap(), &test_defaults().current);
    assert!(!store.is_upgrade_suggested());
    assert_eq!(decrypted_secrets(&store), before);

    store.upload().await.unwrap();
    let stored = storage.stored().unwrap();
    assert_eq!(stored.settings.data_version, CURRENT_DATA_VERSION);
    let params = stored.settings.crypto_params.unwrap();
    assert_eq!(params.cipher_mode, "AES-GCM");

    // A fresh session opens the upgraded vault with the same password.
    let mut fresh = CredentialStore::with_defaults(storage, test_defaults());
    fresh.download().await.unwrap();
    fresh.unlock("p@ss1").await.unwrap();
    assert_eq!(decrypted_secrets(&fresh), before);
}

#[tokio::test]
async fn test_state_listeners_observe_transitions() {
    let (mut store, _storage) = new_store();
    let states = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&states);
    let handle = store.add_state_listener(Box::new(move |state| {
        sink.lock().unwrap().push(state);
    }));
    // Fired once on registration.
    assert_eq!(*states.lock().unwrap(), [VaultState::Initial]);

    store.download().await.unwrap();
    assert_eq!(
        *states.lock().unwrap(),
        [VaultState::Initial, VaultState::Fetching, VaultState::Missing]
    );

    store.remove_state_listener(handle);
    store.create("p@ss1").await.unwrap();
    assert_eq!(states.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_reset_returns_to_initial() {
    let (mut store, _storage) = created_store("p@ss1").await;
    store.reset();
    assert_eq!(store.state(), VaultState::Initial);
    assert!(store.model().is_err());
    assert!(store.document().is_err());
    // The backend still has the document; a new session can start over.
    store.download().await.unwrap();
    assert_eq!(store.state(), VaultState::Locked);
}

#[tokio::test]
async fn test_upload_requires_loaded_vault() {
    let (mut store, _storage) = new_store();
    assert!(store.upload().await.is_err());

    let (_created, storage) = created_store("p@ss1").await;
    let mut locked = CredentialStore::with_defaults(storage, test_defaults());
    locked.download().await.unwrap();
    // Locked: no decrypted model to encrypt, no resident key.
    let err = locked.upload().await.unwrap_err();
    assert_eq!(err.code(), "db/invalid-state");
}

#[test]
fn test_operation_guard_rejects_overlap() {
    let flag = Arc::new(AtomicBool::new(false));
    let guard = OpGuard::acquire(&flag).unwrap();
    let err = OpGuard::acquire(&flag).unwrap_err();
    assert_eq!(err.code(), "db/operation-in-progress");
    drop(guard);
    assert!(OpGuard::acquire(&flag).is_ok());
}
