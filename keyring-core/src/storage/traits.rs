//! Host-provided storage interfaces consumed by the keyring.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::error::StorageResult;

/// Durable, namespaced key-value storage for ciphertext records.
///
/// Values are opaque bytes (CBOR-encoded secret envelopes). Keys follow the
/// `<namespace>.<kind>.<id>` convention so that enumeration can be done with a
/// prefix scan.
///
/// Implementations must provide at least "last write wins" consistency.
/// [`set`](Self::set) receives every entry of a password rotation in a single
/// call; backends that can apply it as one transaction should do so.
#[async_trait]
pub trait PersistedSecretStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Reads several keys at once. Missing keys are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get_many(&self, keys: &[String]) -> StorageResult<BTreeMap<String, Vec<u8>>>;

    /// Lists every stored key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot enumerate its keys.
    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Writes every entry of `entries` as one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. Whether a failed batch may have
    /// been partially applied depends on the backend.
    async fn set(&self, entries: BTreeMap<String, Vec<u8>>) -> StorageResult<()>;

    /// Removes `keys`. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn remove(&self, keys: &[String]) -> StorageResult<()>;

    /// Removes everything in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be cleared.
    async fn clear(&self) -> StorageResult<()>;
}

/// Volatile key-value storage that is wiped when the session ends.
///
/// The keyring stores exactly one entry here: the exported master key,
/// present only while unlocked.
#[async_trait]
pub trait SessionKeyCache: Send + Sync {
    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Removes `key`. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}
