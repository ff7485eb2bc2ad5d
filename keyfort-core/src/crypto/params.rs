//! Versioned cryptographic parameter sets.
//!
//! The parameters of a vault are stored unencrypted in the document settings
//! so that the master key can be derived before anything is decrypted. The
//! defaults have evolved over the product's life; old vaults keep working
//! with the parameters they were written with until they are upgraded.

use std::fmt;

/// Password salt length in bytes.
pub const SALT_LEN: usize = 32;

/// Derived AES key length in bytes (AES-256 for both cipher modes).
pub const KEY_LEN: usize = 32;

/// Hard floor for the PBKDF2 iteration count. The legacy generation (2048)
/// passes; anything below is rejected as a fatal configuration error.
pub const MIN_ITERATIONS: u32 = 1024;

/// Key derivation function family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDerivation {
    Pbkdf2,
}

impl KeyDerivation {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyDerivation::Pbkdf2 => "PBKDF2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PBKDF2" => Some(KeyDerivation::Pbkdf2),
            _ => None,
        }
    }
}

impl fmt::Display for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash used inside the key derivation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha256,
}

impl HashAlg {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlg::Sha256 => "SHA-256",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SHA-256" => Some(HashAlg::Sha256),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block cipher mode of operation.
///
/// The mode dictates the IV length and the failure semantics on tampering:
/// AES-GCM authenticates and rejects modified ciphertext, AES-CBC surfaces
/// tampering as a padding or parse failure further up the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    AesCbc,
    AesGcm,
}

impl CipherMode {
    /// Required initialization vector length for this mode.
    pub fn iv_len(&self) -> usize {
        match self {
            CipherMode::AesCbc => 16,
            CipherMode::AesGcm => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CipherMode::AesCbc => "AES-CBC",
            CipherMode::AesGcm => "AES-GCM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AES-CBC" => Some(CipherMode::AesCbc),
            "AES-GCM" => Some(CipherMode::AesGcm),
            _ => None,
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One full parameter set for key derivation and payload encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoParams {
    pub derive_algo: KeyDerivation,
    pub hash_algo: HashAlg,
    pub cipher_mode: CipherMode,
    pub iterations: u32,
}

/// The generations of default parameters, indexed by age.
///
/// This is explicit, injectable configuration rather than a process-wide
/// constant so that tests can exercise multiple "current default"
/// generations deterministically.
#[derive(Debug, Clone)]
pub struct CryptoDefaults {
    /// Parameters of the first release. Still supported for reading and
    /// unlocking old vaults, never used to write a new one.
    pub legacy: CryptoParams,
    /// Parameters written to every new or upgraded vault.
    pub current: CryptoParams,
}

impl Default for CryptoDefaults {
    fn default() -> Self {
        Self {
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
                iterations: 600_000,
            },
        }
    }
}
