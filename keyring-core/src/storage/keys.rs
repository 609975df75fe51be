//! Storage key namespacing.
//!
//! ```text
//! <namespace>.mnemonic.<0xChecksumAddress>
//! <namespace>.privateKey.<0xChecksumAddress>
//! <namespace>.encryptionKey
//! ```

use std::str::FromStr;

use alloy_primitives::Address;
use strum::{Display, EnumString};

const SESSION_KEY_SUFFIX: &str = "encryptionKey";
const ASSOCIATED_DATA_LABEL: &str = "keyring";

/// The kinds of secret the keyring protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum SecretKind {
    /// A BIP-39 mnemonic, keyed by its index-0 address.
    Mnemonic,
    /// A raw secp256k1 private key, keyed by its address.
    PrivateKey,
}

/// Builds and parses the storage keys of one keyring namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    namespace: String,
}

impl StorageKeys {
    /// Creates the key scheme for `namespace`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prefix shared by every secret of `kind`.
    #[must_use]
    pub fn prefix(&self, kind: SecretKind) -> String {
        format!("{}.{kind}.", self.namespace)
    }

    /// Storage key of the secret of `kind` with id `id`.
    #[must_use]
    pub fn secret(&self, kind: SecretKind, id: &Address) -> String {
        format!("{}{}", self.prefix(kind), id.to_checksum(None))
    }

    /// Extracts the id from a storage key of `kind`.
    ///
    /// Returns `None` for keys of another kind or namespace, or with a
    /// malformed id.
    #[must_use]
    pub fn parse_id(&self, kind: SecretKind, key: &str) -> Option<Address> {
        key.strip_prefix(&self.prefix(kind))
            .and_then(|id| Address::from_str(id).ok())
    }

    /// Key of the single session slot holding the exported master key.
    #[must_use]
    pub fn session(&self) -> String {
        format!("{}.{SESSION_KEY_SUFFIX}", self.namespace)
    }
}

/// AEAD associated data binding a ciphertext to its slot.
///
/// ```text
/// "keyring:" || kind || ":" || checksum(id)
/// ```
#[must_use]
pub fn associated_data(kind: SecretKind, id: &Address) -> Vec<u8> {
    format!("{ASSOCIATED_DATA_LABEL}:{kind}:{}", id.to_checksum(None)).into_bytes()
}
