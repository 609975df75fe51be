//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use alloy_primitives::Address;
use async_trait::async_trait;
use keyring_core::{
    crypto::{CryptoError, CryptoPrimitives, MasterKey, StandardCrypto},
    storage::{
        MemorySecretStore, MemorySessionCache, PersistedSecretStore, SecretEnvelope,
        StorageError, StorageKeys, StorageResult,
    },
    KdfParams, KdfPreset, Keyring, KeyringConfig, SecretKind,
};
use zeroize::Zeroizing;

pub const NAMESPACE: &str = "test";

pub const HARDHAT: &str = "test test test test test test test test test test test junk";
pub const ABANDON: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const DOVE: &str =
    "dove lumber quote board young robust kit invite plastic regular skull history";

/// A [`MemorySecretStore`] whose batched writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemorySecretStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.inner.snapshot().expect("snapshot")
    }
}

#[async_trait]
impl PersistedSecretStore for FlakyStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<BTreeMap<String, Vec<u8>>> {
        self.inner.get_many(keys).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }

    async fn set(&self, entries: BTreeMap<String, Vec<u8>>) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected write failure".to_string()));
        }
        self.inner.set(entries).await
    }

    async fn remove(&self, keys: &[String]) -> StorageResult<()> {
        self.inner.remove(keys).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.inner.clear().await
    }
}

/// [`StandardCrypto`] that records the thread each key derivation runs on.
#[derive(Default)]
pub struct RecordingCrypto {
    derive_threads: Mutex<Vec<ThreadId>>,
}

impl RecordingCrypto {
    pub fn derive_threads(&self) -> Vec<ThreadId> {
        self.derive_threads.lock().expect("lock").clone()
    }
}

impl CryptoPrimitives for RecordingCrypto {
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<MasterKey, CryptoError> {
        self.derive_threads
            .lock()
            .expect("lock")
            .push(std::thread::current().id());
        StandardCrypto.derive_key(password, salt, params)
    }

    fn export_key(&self, key: &MasterKey) -> String {
        StandardCrypto.export_key(key)
    }

    fn import_key(&self, exported: &str) -> Result<MasterKey, CryptoError> {
        StandardCrypto.import_key(exported)
    }

    fn encrypt(
        &self,
        key: &MasterKey,
        iv: &[u8],
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        StandardCrypto.encrypt(key, iv, associated_data, plaintext)
    }

    fn decrypt(
        &self,
        key: &MasterKey,
        iv: &[u8],
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        StandardCrypto.decrypt(key, iv, associated_data, ciphertext)
    }

    fn generate_salt(&self) -> Vec<u8> {
        StandardCrypto.generate_salt()
    }

    fn generate_iv(&self) -> Vec<u8> {
        StandardCrypto.generate_iv()
    }
}

pub struct Harness {
    pub keyring: Arc<Keyring>,
    pub store: Arc<FlakyStore>,
    pub session: Arc<MemorySessionCache>,
}

pub fn config() -> KeyringConfig {
    KeyringConfig::new(NAMESPACE, KdfPreset::Testing)
}

pub fn harness() -> Harness {
    let store = Arc::new(FlakyStore::new());
    let session = Arc::new(MemorySessionCache::new());
    let keyring = Keyring::new(config(), store.clone(), session.clone()).expect("keyring");
    Harness {
        keyring: Arc::new(keyring),
        store,
        session,
    }
}

pub fn storage_key(kind: SecretKind, id: &Address) -> String {
    StorageKeys::new(NAMESPACE).secret(kind, id)
}

pub async fn read_envelope(store: &FlakyStore, kind: SecretKind, id: &Address) -> SecretEnvelope {
    let bytes = store
        .get(&storage_key(kind, id))
        .await
        .expect("get")
        .expect("record exists");
    SecretEnvelope::deserialize(&bytes).expect("envelope")
}

/// Flips one ciphertext byte of a stored record.
pub async fn tamper(store: &FlakyStore, kind: SecretKind, id: &Address) {
    let envelope = read_envelope(store, kind, id).await;
    let mut ciphertext = envelope.ciphertext.clone();
    ciphertext[0] ^= 0xFF;
    let tampered = SecretEnvelope::new(envelope.kdf, envelope.salt, envelope.iv, ciphertext);
    store
        .set(BTreeMap::from([(
            storage_key(kind, id),
            tampered.serialize().expect("serialize"),
        )]))
        .await
        .expect("set");
}
