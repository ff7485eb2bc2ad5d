//! In-memory and wire representation of the credential collection.
//!
//! All binary fields are base64 encoded because the model is serialized with
//! JSON. Even after the vault is downloaded and decrypted, the sensitive
//! fields of each entry remain encrypted until explicitly revealed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

fn new_entry_id() -> String {
    Uuid::new_v4().to_string()
}

/// A single credential entry.
///
/// `name`, `icon`, `url`, `email`, `login` and `keywords` are plaintext,
/// searchable metadata. `password` and `notes` are base64-encoded ciphertext
/// encrypted under `aes_iv`; a zero-length ciphertext marks an empty value.
///
/// Fields added after the initial release (`keywords`, `id`) carry serde
/// defaults so payloads written before the field existed still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct CredentialEntry {
    /// Stable opaque identifier; entry lookups key on this, not on position.
    #[serde(default = "new_entry_id")]
    pub id: String,
    pub name: String,
    pub icon: String,
    pub url: String,
    pub email: String,
    pub login: String,
    #[serde(default)]
    pub keywords: String,
    /// Base64 encoded AES IV for the fields below.
    #[serde(rename = "aesIv")]
    pub aes_iv: String,
    /// Encrypted, even in the decrypted model.
    pub password: String,
    /// Encrypted, even in the decrypted model.
    pub notes: String,
}

impl CredentialEntry {
    /// Creates an empty entry with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: new_entry_id(),
            name: String::new(),
            icon: String::new(),
            url: String::new(),
            email: String::new(),
            login: String::new(),
            keywords: String::new(),
            aes_iv: String::new(),
            password: String::new(),
            notes: String::new(),
        }
    }
}

impl Default for CredentialEntry {
    fn default() -> Self {
        Self::new()
    }
}

/// The credential collection that gets fully encrypted as the vault payload.
///
/// Entries keep their insertion order and are unique by `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct VaultModel {
    #[serde(default)]
    pub entries: Vec<CredentialEntry>,
}

impl VaultModel {
    /// Looks up an entry by its stable identifier.
    pub fn entry(&self, id: &str) -> Option<&CredentialEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// The entries seeded into every newly created vault. Their sensitive fields
/// are still plaintext here; the store encrypts them during creation.
pub fn starter_entries() -> Vec<CredentialEntry> {
    vec![
        CredentialEntry {
            name: "Amazon".into(),
            icon: "icons:shopping-cart".into(),
            url: "https://amazon.com".into(),
            email: "test@tester.com".into(),
            login: "".into(),
            keywords: "amazon shopping".into(),
            password: "pass123".into(),
            notes: "".into(),
            ..CredentialEntry::new()
        },
        CredentialEntry {
            name: "E-Bay".into(),
            icon: "icons:shopping-cart".into(),
            url: "https://ebay.com".into(),
            email: "test@tester.com".into(),
            login: "tester".into(),
            keywords: "shopping".into(),
            password: "pass321".into(),
            notes: "Never buy from user bigcheat16 again!".into(),
            ..CredentialEntry::new()
        },
        CredentialEntry {
            name: "Gmail".into(),
            icon: "communication:email".into(),
            url: "https://gmail.com".into(),
            email: "tester@gmail.com".into(),
            login: "".into(),
            keywords: "google email".into(),
            password: "pass213".into(),
            notes: "".into(),
            ..CredentialEntry::new()
        },
    ]
}
