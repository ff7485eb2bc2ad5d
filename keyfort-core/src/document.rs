//! Wire document codec and schema migrations.
//!
//! A vault is persisted as one document: unencrypted settings (crypto
//! parameters, password salt, vault IV, schema version) next to the base64
//! encoded ciphertext of the whole model. The settings must be readable
//! before the master key exists.
//!
//! Old documents are migrated forward on read through a strictly ordered
//! chain of pure settings transforms; documents are always written back at
//! the current version.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::params::{
    CipherMode, CryptoDefaults, CryptoParams, HashAlg, KeyDerivation, MIN_ITERATIONS, SALT_LEN,
};

/// Schema version written to every encoded document.
pub const CURRENT_DATA_VERSION: u32 = 2;

/// Errors raised while decoding or validating a document. All of them are
/// fatal configuration problems, distinct from a wrong password.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document format not recognized: {0}")]
    UnrecognizedFormat(String),

    #[error("document version {0} is newer than this application supports")]
    UnsupportedVersion(u32),

    #[error("no migration path from document version {0}")]
    NoMigrationPath(u32),

    #[error("invalid crypto parameters: {0}")]
    InvalidCryptoParams(String),
}

impl DocumentError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::UnrecognizedFormat(_) => "db/unexpected-format",
            DocumentError::UnsupportedVersion(_) => "db/unsupported-version",
            DocumentError::NoMigrationPath(_) => "db/no-migration-path",
            DocumentError::InvalidCryptoParams(_) => "db/invalid-crypto-params",
        }
    }
}

/// Crypto parameters as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedCryptoParams {
    #[serde(rename = "deriveAlgo")]
    pub derive_algo: String,
    #[serde(rename = "hashAlgo")]
    pub hash_algo: String,
    #[serde(rename = "cipherMode")]
    pub cipher_mode: String,
    pub iterations: u32,
}

/// Unencrypted document settings as they appear on the wire.
///
/// `cryptoParams` is optional because version 1 documents predate it; the
/// migration chain fills it in with the legacy defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSettings {
    #[serde(rename = "cryptoParams", default, skip_serializing_if = "Option::is_none")]
    pub crypto_params: Option<EncodedCryptoParams>,
    /// Base64 encoded, 32 bytes.
    #[serde(rename = "passSalt")]
    pub pass_salt: String,
    /// Base64 encoded, length depends on the cipher mode.
    #[serde(rename = "aesIv")]
    pub aes_iv: String,
    #[serde(rename = "dataVersion", default)]
    pub data_version: u32,
}

/// The document uploaded to and downloaded from the storage backend. The
/// backend treats both fields as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDocument {
    pub settings: EncodedSettings,
    /// Base64 encoded ciphertext of the JSON-serialized model.
    pub payload: String,
}

/// Decoded, validated document settings.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    pub crypto_params: CryptoParams,
    pub pass_salt: Vec<u8>,
    pub aes_iv: Vec<u8>,
    pub data_version: u32,
}

/// Converts between wire documents and decoded settings/payload pairs, and
/// owns the version migration chain.
///
/// The codec is parameterized by the defaults table so tests can exercise
/// multiple parameter generations deterministically.
pub struct DocumentCodec {
    defaults: CryptoDefaults,
}

impl DocumentCodec {
    pub fn new(defaults: CryptoDefaults) -> Self {
        Self { defaults }
    }

    /// Decodes, migrates and validates a downloaded document.
    pub fn decode(
        &self,
        document: &VaultDocument,
    ) -> Result<(VaultSettings, Vec<u8>), DocumentError> {
        if document.settings.pass_salt.is_empty()
            || document.settings.aes_iv.is_empty()
            || document.payload.is_empty()
        {
            return Err(DocumentError::UnrecognizedFormat(
                "missing settings or payload".into(),
            ));
        }

        let settings = self.migrate(document.settings.clone())?;

        let encoded_params = settings.crypto_params.as_ref().ok_or_else(|| {
            DocumentError::UnrecognizedFormat("crypto parameters missing after migration".into())
        })?;
        let crypto_params = parse_params(encoded_params)?;

        let pass_salt = decode_field(&settings.pass_salt, "passSalt")?;
        if pass_salt.len() != SALT_LEN {
            return Err(DocumentError::InvalidCryptoParams(format!(
                "password salt must be {SALT_LEN} bytes, got {}",
                pass_salt.len()
            )));
        }

        let aes_iv = decode_field(&settings.aes_iv, "aesIv")?;
        if aes_iv.len() != crypto_params.cipher_mode.iv_len() {
            return Err(DocumentError::InvalidCryptoParams(format!(
                "IV must be {} bytes for {}, got {}",
                crypto_params.cipher_mode.iv_len(),
                crypto_params.cipher_mode,
                aes_iv.len()
            )));
        }

        let payload = decode_field(&document.payload, "payload")?;

        Ok((
            VaultSettings {
                crypto_params,
                pass_salt,
                aes_iv,
                data_version: settings.data_version,
            },
            payload,
        ))
    }

    /// Encodes settings and ciphertext into a wire document.
    ///
    /// Always writes the current schema version, even when the settings came
    /// from a migrated legacy document; migration is one-directional.
    pub fn encode(&self, settings: &VaultSettings, payload: &[u8]) -> VaultDocument {
        VaultDocument {
            settings: EncodedSettings {
                crypto_params: Some(encode_params(&settings.crypto_params)),
                pass_salt: STANDARD.encode(&settings.pass_salt),
                aes_iv: STANDARD.encode(&settings.aes_iv),
                data_version: CURRENT_DATA_VERSION,
            },
            payload: STANDARD.encode(payload),
        }
    }

    /// Applies the migration chain until the settings are at the current
    /// version.
    fn migrate(&self, mut settings: EncodedSettings) -> Result<EncodedSettings, DocumentError> {
        if settings.data_version == 0 {
            return Err(DocumentError::UnrecognizedFormat(
                "document version unspecified".into(),
            ));
        }
        if settings.data_version > CURRENT_DATA_VERSION {
            return Err(DocumentError::UnsupportedVersion(settings.data_version));
        }

        while settings.data_version < CURRENT_DATA_VERSION {
            settings = match settings.data_version {
                1 => migrate_v1_to_v2(&self.defaults, settings),
                version => return Err(DocumentError::NoMigrationPath(version)),
            };
        }

        if settings.data_version != CURRENT_DATA_VERSION {
            return Err(DocumentError::NoMigrationPath(settings.data_version));
        }
        Ok(settings)
    }
}

/// v1 documents predate configurable crypto parameters; they were all
/// written with the legacy set.
fn migrate_v1_to_v2(defaults: &CryptoDefaults, mut settings: EncodedSettings) -> EncodedSettings {
    if settings.crypto_params.is_none() {
        settings.crypto_params = Some(encode_params(&defaults.legacy));
    }
    settings.data_version = 2;
    settings
}

fn parse_params(encoded: &EncodedCryptoParams) -> Result<CryptoParams, DocumentError> {
    let derive_algo = KeyDerivation::parse(&encoded.derive_algo).ok_or_else(|| {
        DocumentError::InvalidCryptoParams(format!(
            "unsupported key derivation {:?}",
            encoded.derive_algo
        ))
    })?;
    let hash_algo = HashAlg::parse(&encoded.hash_algo).ok_or_else(|| {
        DocumentError::InvalidCryptoParams(format!("unsupported hash {:?}", encoded.hash_algo))
    })?;
    let cipher_mode = CipherMode::parse(&encoded.cipher_mode).ok_or_else(|| {
        DocumentError::InvalidCryptoParams(format!(
            "unsupported cipher mode {:?}",
            encoded.cipher_mode
        ))
    })?;
    if encoded.iterations < MIN_ITERATIONS {
        return Err(DocumentError::InvalidCryptoParams(format!(
            "iteration count {} below minimum {MIN_ITERATIONS}",
            encoded.iterations
        )));
    }
    Ok(CryptoParams {
        derive_algo,
        hash_algo,
        cipher_mode,
        iterations: encoded.iterations,
    })
}

fn encode_params(params: &CryptoParams) -> EncodedCryptoParams {
    EncodedCryptoParams {
        derive_algo: params.derive_algo.as_str().into(),
        hash_algo: params.hash_algo.as_str().into(),
        cipher_mode: params.cipher_mode.as_str().into(),
        iterations: params.iterations,
    }
}

fn decode_field(field: &str, name: &str) -> Result<Vec<u8>, DocumentError> {
    STANDARD
        .decode(field)
        .map_err(|_| DocumentError::UnrecognizedFormat(format!("field {name} is not base64")))
}
