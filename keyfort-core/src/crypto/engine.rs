//! Master key derivation and payload encryption.
//!
//! The engine holds the only copy of the live master key. The key is derived
//! from the user password and a 32-byte salt with PBKDF2-HMAC-SHA-256 and is
//! overwritten in memory when cleared, not merely dropped.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::params::{CryptoParams, HashAlg, KeyDerivation, KEY_LEN, MIN_ITERATIONS, SALT_LEN};
use crate::crypto::{CipherMode, CryptoError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// The symmetric key derived from the master password.
///
/// Never persisted. Zeroized when dropped, so clearing the engine's key slot
/// overwrites the key bytes on every exit path.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self(key)
    }

    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Derives the master key and executes the symmetric cipher with it.
///
/// The encrypt/decrypt operations require an initialization vector that is
/// 16 bytes for AES-CBC and 12 bytes for AES-GCM. Decryption requires the
/// same IV used for encryption. Both the salt and the IV are stored in plain
/// text alongside the encrypted payload.
#[derive(Default)]
pub struct CryptoEngine {
    master_key: Option<MasterKey>,
}

impl CryptoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the master key from the master password and salt.
    ///
    /// The salt is mixed into the derivation so that two users with the same
    /// password get different keys. It must be randomized every time a new
    /// password is chosen.
    pub fn set_master_key(
        &mut self,
        password: &str,
        salt: &[u8],
        params: &CryptoParams,
    ) -> Result<()> {
        if password.is_empty() {
            return Err(CryptoError::EmptyPassword);
        }
        if salt.len() != SALT_LEN {
            return Err(CryptoError::InvalidSalt {
                expected: SALT_LEN,
                got: salt.len(),
            });
        }
        if params.iterations < MIN_ITERATIONS {
            return Err(CryptoError::DeriveKeyFailed);
        }

        let mut key = [0u8; KEY_LEN];
        match (params.derive_algo, params.hash_algo) {
            (KeyDerivation::Pbkdf2, HashAlg::Sha256) => {
                pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, params.iterations, &mut key);
            }
        }

        self.master_key = Some(MasterKey::from_bytes(key));
        key.zeroize();
        Ok(())
    }

    /// Returns true if the master key is set.
    pub fn has_master_key(&self) -> bool {
        self.master_key.is_some()
    }

    /// Removes the master key from memory, overwriting the key bytes.
    pub fn clear_master_key(&mut self) {
        // MasterKey zeroizes on drop.
        self.master_key.take();
    }

    /// Generates a random password salt.
    pub fn make_random_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Generates a random initialization vector sized for the cipher mode.
    pub fn make_random_iv(params: &CryptoParams) -> Vec<u8> {
        let mut iv = vec![0u8; params.cipher_mode.iv_len()];
        OsRng.fill_bytes(&mut iv);
        iv
    }

    /// Encrypts a byte buffer under the resident master key.
    pub fn encrypt_raw(&self, data: &[u8], iv: &[u8], params: &CryptoParams) -> Result<Vec<u8>> {
        let key = self.key()?;
        check_iv(params.cipher_mode, iv)?;

        match params.cipher_mode {
            CipherMode::AesCbc => {
                let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
                    .map_err(|_| CryptoError::EncryptFailed)?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
            }
            CipherMode::AesGcm => {
                let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                    .map_err(|_| CryptoError::EncryptFailed)?;
                cipher
                    .encrypt(Nonce::from_slice(iv), data)
                    .map_err(|_| CryptoError::EncryptFailed)
            }
        }
    }

    /// Decrypts a byte buffer under the resident master key.
    ///
    /// Any decryption or authentication failure is reported as
    /// [`CryptoError::WrongPassword`]; callers cannot tell a bad password
    /// from tampered ciphertext.
    pub fn decrypt_raw(&self, data: &[u8], iv: &[u8], params: &CryptoParams) -> Result<Vec<u8>> {
        let key = self.key()?;
        check_iv(params.cipher_mode, iv)?;

        match params.cipher_mode {
            CipherMode::AesCbc => {
                let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
                    .map_err(|_| CryptoError::WrongPassword)?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| CryptoError::WrongPassword)
            }
            CipherMode::AesGcm => {
                let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                    .map_err(|_| CryptoError::WrongPassword)?;
                cipher
                    .decrypt(Nonce::from_slice(iv), data)
                    .map_err(|_| CryptoError::WrongPassword)
            }
        }
    }

    /// Encrypts a string. The empty string short-circuits to a zero-length
    /// ciphertext without invoking the cipher, so "never set" and "set to
    /// empty" stay distinguishable and cheap.
    pub fn encrypt_string(&self, plain: &str, iv: &[u8], params: &CryptoParams) -> Result<Vec<u8>> {
        if plain.is_empty() {
            return Ok(Vec::new());
        }
        self.encrypt_raw(plain.as_bytes(), iv, params)
    }

    /// Decrypts to a string. A zero-length ciphertext short-circuits to the
    /// empty string regardless of the IV.
    pub fn decrypt_string(&self, data: &[u8], iv: &[u8], params: &CryptoParams) -> Result<String> {
        if data.is_empty() {
            return Ok(String::new());
        }
        let plain = self.decrypt_raw(data, iv, params)?;
        String::from_utf8(plain).map_err(|_| CryptoError::WrongPassword)
    }

    fn key(&self) -> Result<&MasterKey> {
        self.master_key.as_ref().ok_or(CryptoError::NoMasterKey)
    }
}

fn check_iv(mode: CipherMode, iv: &[u8]) -> Result<()> {
    if iv.len() != mode.iv_len() {
        return Err(CryptoError::InvalidIv {
            mode,
            expected: mode.iv_len(),
            got: iv.len(),
        });
    }
    Ok(())
}
