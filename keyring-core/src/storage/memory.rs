//! In-memory implementations of the storage interfaces.
//!
//! [`MemorySessionCache`] is a real session cache: it lives as long as the
//! process. [`MemorySecretStore`] does not survive restarts and is meant for
//! tests and ephemeral wallets.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    error::{StorageError, StorageResult},
    traits::{PersistedSecretStore, SessionKeyCache},
};

fn poisoned() -> StorageError {
    StorageError::Lock("lock poisoned".to_string())
}

/// In-memory [`PersistedSecretStore`] backed by a `BTreeMap`.
///
/// Batched writes are applied under one lock, so they are atomic.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn snapshot(&self) -> StorageResult<BTreeMap<String, Vec<u8>>> {
        Ok(self.entries.read().map_err(|_| poisoned())?.clone())
    }

    /// Returns the number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }

    /// Returns `true` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl PersistedSecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<BTreeMap<String, Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned())?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set(&self, entries: BTreeMap<String, Vec<u8>>) -> StorageResult<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .extend(entries);
        Ok(())
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

/// Process-lifetime [`SessionKeyCache`].
#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemorySessionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionKeyCache for MemorySessionCache {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_secret_store_crud() {
        let store = MemorySecretStore::new();
        assert!(store.is_empty().unwrap());

        store
            .set(batch(&[("ns.mnemonic.a", b"1"), ("ns.privateKey.b", b"2")]))
            .await
            .unwrap();
        assert_eq!(store.get("ns.mnemonic.a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);

        let many = store
            .get_many(&["ns.mnemonic.a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(many.len(), 1);

        store.remove(&["ns.mnemonic.a".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(store.len().unwrap(), 1);

        store.clear().await.unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_secret_store_prefix_scan() {
        let store = MemorySecretStore::new();
        store
            .set(batch(&[
                ("ns.mnemonic.b", b"1"),
                ("ns.mnemonic.a", b"1"),
                ("ns.privateKey.c", b"2"),
                ("other.mnemonic.d", b"3"),
            ]))
            .await
            .unwrap();

        let keys = store.keys_with_prefix("ns.mnemonic.").await.unwrap();
        assert_eq!(keys, vec!["ns.mnemonic.a", "ns.mnemonic.b"]);
    }

    #[tokio::test]
    async fn test_session_cache() {
        let cache = MemorySessionCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set("k", "v1".to_string()).await.unwrap();
        cache.set("k", "v2".to_string()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v2".to_string()));
        cache.remove("k").await.unwrap();
        cache.remove("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
