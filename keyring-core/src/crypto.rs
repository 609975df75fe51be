//! Cryptographic primitives used to seal secrets at rest.
//!
//! The keyring only talks to the [`CryptoPrimitives`] trait. The default
//! [`StandardCrypto`] derives the master key with Argon2id and seals records
//! with XChaCha20-Poly1305.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::KdfParams;

/// Master key length in bytes.
pub const KEY_SIZE: usize = 32;
/// Salt length in bytes.
pub const SALT_SIZE: usize = 16;
/// XChaCha20-Poly1305 nonce length in bytes.
pub const IV_SIZE: usize = 24;

/// Errors raised by [`CryptoPrimitives`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The KDF rejected its inputs.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Sealing failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed or the ciphertext is malformed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// An exported key could not be imported.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// The symmetric key every secret is sealed under.
///
/// Zeroized on drop. Never logged.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Creates a master key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes. Treat as sensitive material.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Compares two keys in constant time.
    #[must_use]
    pub fn ct_matches(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Key derivation, authenticated encryption and randomness.
pub trait CryptoPrimitives: Send + Sync {
    /// Derives a master key from `password` and `salt`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if the parameters or salt are
    /// rejected.
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<MasterKey, CryptoError>;

    /// Exports a key to a portable string for the session cache.
    fn export_key(&self, key: &MasterKey) -> String;

    /// Imports a key previously produced by [`export_key`](Self::export_key).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if `exported` is not a valid key.
    fn import_key(&self, exported: &str) -> Result<MasterKey, CryptoError>;

    /// Seals `plaintext`, authenticating `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] on a malformed IV.
    fn encrypt(
        &self,
        key: &MasterKey,
        iv: &[u8],
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Opens `ciphertext`, verifying `associated_data`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] on authentication failure.
    fn decrypt(
        &self,
        key: &MasterKey,
        iv: &[u8],
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError>;

    /// Returns a fresh random KDF salt.
    fn generate_salt(&self) -> Vec<u8>;

    /// Returns a fresh random IV. Never reused.
    fn generate_iv(&self) -> Vec<u8>;
}

/// Argon2id + XChaCha20-Poly1305.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCrypto;

impl CryptoPrimitives for StandardCrypto {
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<MasterKey, CryptoError> {
        let argon2_params = argon2::Params::new(
            params.m_cost,
            params.t_cost,
            params.p_cost,
            Some(KEY_SIZE),
        )
        .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?;
        let argon2 = argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2_params,
        );

        let mut output = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(password, salt, &mut output)
            .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?;
        let key = MasterKey::from_bytes(output);
        output.zeroize();
        Ok(key)
    }

    fn export_key(&self, key: &MasterKey) -> String {
        STANDARD.encode(key.as_bytes())
    }

    fn import_key(&self, exported: &str) -> Result<MasterKey, CryptoError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(exported)
                .map_err(|err| CryptoError::InvalidKey(err.to_string()))?,
        );
        let raw: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(MasterKey::from_bytes(raw))
    }

    fn encrypt(
        &self,
        key: &MasterKey,
        iv: &[u8],
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != IV_SIZE {
            return Err(CryptoError::Encryption(format!(
                "iv must be {IV_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        cipher
            .encrypt(
                XNonce::from_slice(iv),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| {
                CryptoError::Encryption("XChaCha20-Poly1305 encryption failed".to_string())
            })
    }

    fn decrypt(
        &self,
        key: &MasterKey,
        iv: &[u8],
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if iv.len() != IV_SIZE {
            return Err(CryptoError::Decryption(format!(
                "iv must be {IV_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        cipher
            .decrypt(
                XNonce::from_slice(iv),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| {
                CryptoError::Decryption("XChaCha20-Poly1305 decryption failed".to_string())
            })
    }

    fn generate_salt(&self) -> Vec<u8> {
        random_bytes(SALT_SIZE)
    }

    fn generate_iv(&self) -> Vec<u8> {
        random_bytes(IV_SIZE)
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KdfPreset;

    const PARAMS: KdfParams = KdfParams::preset(KdfPreset::Testing);

    #[test]
    fn test_derive_key_is_deterministic() {
        let crypto = StandardCrypto;
        let salt = [7u8; SALT_SIZE];
        let a = crypto.derive_key(b"hunter2", &salt, &PARAMS).unwrap();
        let b = crypto.derive_key(b"hunter2", &salt, &PARAMS).unwrap();
        let c = crypto.derive_key(b"hunter3", &salt, &PARAMS).unwrap();
        let d = crypto.derive_key(b"hunter2", &[8u8; SALT_SIZE], &PARAMS).unwrap();

        assert!(a.ct_matches(&b));
        assert!(!a.ct_matches(&c));
        assert!(!a.ct_matches(&d));
    }

    #[test]
    fn test_derive_key_rejects_short_salt() {
        let result = StandardCrypto.derive_key(b"pw", &[1, 2, 3], &PARAMS);
        assert!(matches!(result, Err(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let crypto = StandardCrypto;
        let key = crypto.derive_key(b"pw", &crypto.generate_salt(), &PARAMS).unwrap();
        let iv = crypto.generate_iv();
        let plaintext = b"secret vault data";

        let ciphertext = crypto.encrypt(&key, &iv, b"ad", plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + 16);

        let decrypted = crypto.decrypt(&key, &iv, b"ad", &ciphertext).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn test_decrypt_fails_on_wrong_associated_data() {
        let crypto = StandardCrypto;
        let key = MasterKey::from_bytes([3u8; KEY_SIZE]);
        let iv = crypto.generate_iv();
        let ciphertext = crypto.encrypt(&key, &iv, b"slot-a", b"data").unwrap();

        let result = crypto.decrypt(&key, &iv, b"slot-b", &ciphertext);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_decrypt_fails_on_tampered_ciphertext() {
        let crypto = StandardCrypto;
        let key = MasterKey::from_bytes([3u8; KEY_SIZE]);
        let iv = crypto.generate_iv();
        let mut ciphertext = crypto.encrypt(&key, &iv, b"", b"data").unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(crypto.decrypt(&key, &iv, b"", &ciphertext).is_err());
    }

    #[test]
    fn test_bad_iv_length_is_an_error() {
        let crypto = StandardCrypto;
        let key = MasterKey::from_bytes([3u8; KEY_SIZE]);
        assert!(matches!(
            crypto.encrypt(&key, &[0u8; 12], b"", b"data"),
            Err(CryptoError::Encryption(_))
        ));
        assert!(matches!(
            crypto.decrypt(&key, &[0u8; 12], b"", b"data"),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn test_export_import_key() {
        let crypto = StandardCrypto;
        let key = MasterKey::from_bytes([0x42u8; KEY_SIZE]);
        let exported = crypto.export_key(&key);
        let imported = crypto.import_key(&exported).unwrap();
        assert!(key.ct_matches(&imported));

        assert!(matches!(
            crypto.import_key("not base64!"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            crypto.import_key(&STANDARD.encode([1u8; 16])),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_random_material_is_fresh() {
        let crypto = StandardCrypto;
        assert_eq!(crypto.generate_salt().len(), SALT_SIZE);
        assert_eq!(crypto.generate_iv().len(), IV_SIZE);
        assert_ne!(crypto.generate_iv(), crypto.generate_iv());
    }

    #[test]
    fn test_master_key_debug_is_redacted() {
        let key = MasterKey::from_bytes([0xAB; KEY_SIZE]);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }
}
