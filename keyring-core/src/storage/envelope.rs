//! Persisted secret envelope.

use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::config::KdfParams;

const ENVELOPE_VERSION: u32 = 1;

/// The `{salt, iv, ciphertext}` record stored for every secret, plus the KDF
/// parameters the master key was derived with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEnvelope {
    pub(crate) version: u32,
    /// KDF parameters of the master key this record is sealed under.
    pub kdf: KdfParams,
    /// KDF salt of the master key this record is sealed under.
    pub salt: Vec<u8>,
    /// AEAD nonce, unique per ciphertext.
    pub iv: Vec<u8>,
    /// AEAD ciphertext with tag.
    pub ciphertext: Vec<u8>,
}

impl SecretEnvelope {
    /// Creates a current-version envelope.
    #[must_use]
    pub const fn new(kdf: KdfParams, salt: Vec<u8>, iv: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            kdf,
            salt,
            iv,
            ciphertext,
        }
    }

    /// Encodes the envelope as CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if encoding fails.
    pub fn serialize(&self) -> StorageResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        Ok(bytes)
    }

    /// Decodes an envelope and checks its version.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] for malformed bytes and
    /// [`StorageError::UnsupportedEnvelopeVersion`] for unknown versions.
    pub fn deserialize(bytes: &[u8]) -> StorageResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(StorageError::UnsupportedEnvelopeVersion(envelope.version));
        }
        Ok(envelope)
    }
}
