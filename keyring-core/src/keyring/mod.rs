//! The keyring orchestrator: lock state, secret lifecycle and password
//! rotation on top of the storage and crypto collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::Address;
use log::{debug, info, warn};
use strum::Display;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::{
    config::{KdfParams, KeyringConfig},
    crypto::{CryptoError, CryptoPrimitives, MasterKey, StandardCrypto},
    error::{KeyringError, KeyringResult},
    hd,
    storage::{
        associated_data, PersistedSecretStore, SecretEnvelope, SecretKind,
        SessionKeyCache, StorageKeys,
    },
};

mod rotation;
mod secrets;

/// Whether the master key is currently held in the session cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LockState {
    /// No master key in the session cache.
    Locked,
    /// The master key is in the session cache.
    Unlocked,
}

/// Encrypted store of mnemonics and private keys.
///
/// The lock state is derived from the session cache alone: the keyring is
/// unlocked exactly when the session slot holds an exported master key.
/// Every secret is sealed under that one key, derived from the password and
/// the salt recorded in the verification mnemonic (the mnemonic with the
/// lowest id).
///
/// Operations are serialized through an internal read/write lock: anything
/// that writes the store or the session slot is exclusive.
pub struct Keyring {
    store: Arc<dyn PersistedSecretStore>,
    session: Arc<dyn SessionKeyCache>,
    crypto: Arc<dyn CryptoPrimitives>,
    config: KeyringConfig,
    keys: StorageKeys,
    op_lock: RwLock<()>,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("namespace", &self.keys.namespace())
            .finish_non_exhaustive()
    }
}

/// Salt and KDF parameters of the master key a record is sealed under.
#[derive(Clone)]
struct MasterParams {
    kdf: KdfParams,
    salt: Vec<u8>,
}

impl MasterParams {
    fn of(envelope: &SecretEnvelope) -> Self {
        Self {
            kdf: envelope.kdf,
            salt: envelope.salt.clone(),
        }
    }
}

impl Keyring {
    /// Creates a keyring using the default Argon2id/XChaCha20-Poly1305
    /// primitives.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfig`] if `config` is invalid.
    pub fn new(
        config: KeyringConfig,
        store: Arc<dyn PersistedSecretStore>,
        session: Arc<dyn SessionKeyCache>,
    ) -> KeyringResult<Self> {
        Self::with_crypto(config, store, session, Arc::new(StandardCrypto))
    }

    /// Creates a keyring with explicit crypto primitives.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfig`] if `config` is invalid.
    pub fn with_crypto(
        config: KeyringConfig,
        store: Arc<dyn PersistedSecretStore>,
        session: Arc<dyn SessionKeyCache>,
        crypto: Arc<dyn CryptoPrimitives>,
    ) -> KeyringResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            session,
            crypto,
            keys: StorageKeys::new(config.namespace.clone()),
            config,
            op_lock: RwLock::new(()),
        })
    }

    /// Returns the configuration this keyring was created with.
    #[must_use]
    pub const fn config(&self) -> &KeyringConfig {
        &self.config
    }

    /// Returns the current lock state.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cache cannot be read.
    pub async fn state(&self) -> KeyringResult<LockState> {
        let _guard = self.op_lock.read().await;
        self.current_state().await
    }

    /// Returns `true` if the keyring is unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cache cannot be read.
    pub async fn is_unlocked(&self) -> KeyringResult<bool> {
        Ok(self.state().await? == LockState::Unlocked)
    }

    /// Unlocks the keyring.
    ///
    /// The password is checked against the verification mnemonic. On success
    /// the derived master key is written to the session cache. A wrong
    /// password, an empty store or an unreadable verification record all
    /// return `Ok(false)` and leave the session cache untouched.
    ///
    /// # Errors
    ///
    /// Only storage failures are returned as errors.
    pub async fn unlock(&self, password: &str) -> KeyringResult<bool> {
        let _guard = self.op_lock.write().await;

        let Some(id) = self.ids(SecretKind::Mnemonic).await?.first().copied() else {
            warn!("unlock rejected: no mnemonic to verify the password against");
            return Ok(false);
        };
        let envelope = match self.load(SecretKind::Mnemonic, &id).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(false),
            Err(KeyringError::Storage(err)) => return Err(err.into()),
            Err(err) => {
                warn!("unlock rejected: {err}");
                return Ok(false);
            }
        };

        let Some(key) = self
            .verify_password(password, SecretKind::Mnemonic, &id, &envelope)
            .await
        else {
            warn!("unlock rejected: wrong password");
            return Ok(false);
        };

        self.session
            .set(&self.keys.session(), self.crypto.export_key(&key))
            .await?;
        info!("keyring unlocked");
        Ok(true)
    }

    /// Clears the master key from the session cache. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cache cannot be written.
    pub async fn lock(&self) -> KeyringResult<()> {
        let _guard = self.op_lock.write().await;
        self.session.remove(&self.keys.session()).await?;
        debug!("keyring locked");
        Ok(())
    }

    /// Returns the ids of every stored mnemonic, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    pub async fn get_mnemonic_ids(&self) -> KeyringResult<Vec<Address>> {
        let _guard = self.op_lock.read().await;
        self.ids(SecretKind::Mnemonic).await
    }

    /// Returns the addresses of every stored private key, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    pub async fn get_addresses_for_stored_private_keys(&self) -> KeyringResult<Vec<Address>> {
        let _guard = self.op_lock.read().await;
        self.ids(SecretKind::PrivateKey).await
    }

    /// Removes a mnemonic. Removing an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn remove_mnemonic(&self, id: &Address) -> KeyringResult<()> {
        self.remove(SecretKind::Mnemonic, id).await
    }

    /// Removes a private key. Removing an unknown address is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn remove_private_key(&self, address: &Address) -> KeyringResult<()> {
        self.remove(SecretKind::PrivateKey, address).await
    }

    /// Removes every mnemonic and private key of this keyring's namespace.
    ///
    /// The lock state is left as it is.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated or the delete fails.
    pub async fn remove_all_mnemonics_and_private_keys(&self) -> KeyringResult<()> {
        let _guard = self.op_lock.write().await;
        let mut keys = self
            .store
            .keys_with_prefix(&self.keys.prefix(SecretKind::Mnemonic))
            .await?;
        keys.extend(
            self.store
                .keys_with_prefix(&self.keys.prefix(SecretKind::PrivateKey))
                .await?,
        );
        if !keys.is_empty() {
            self.store.remove(&keys).await?;
        }
        info!("removed all secrets ({} records)", keys.len());
        Ok(())
    }

    async fn remove(&self, kind: SecretKind, id: &Address) -> KeyringResult<()> {
        let _guard = self.op_lock.write().await;
        self.store.remove(&[self.keys.secret(kind, id)]).await?;
        debug!("removed {kind} {id}");
        Ok(())
    }
}

/// Helpers. Callers hold `op_lock`.
impl Keyring {
    async fn current_state(&self) -> KeyringResult<LockState> {
        let exported = self.session.get(&self.keys.session()).await?.map(Zeroizing::new);
        Ok(if exported.is_some() {
            LockState::Unlocked
        } else {
            LockState::Locked
        })
    }

    async fn require_unlocked(&self) -> KeyringResult<()> {
        match self.current_state().await? {
            LockState::Unlocked => Ok(()),
            LockState::Locked => Err(KeyringError::Locked),
        }
    }

    /// Reads the live master key. Call right before using it.
    async fn session_key(&self) -> KeyringResult<MasterKey> {
        let exported = self
            .session
            .get(&self.keys.session())
            .await?
            .map(Zeroizing::new)
            .ok_or(KeyringError::Locked)?;
        self.crypto
            .import_key(&exported)
            .map_err(|_| KeyringError::InvalidSessionKey)
    }

    async fn ids(&self, kind: SecretKind) -> KeyringResult<Vec<Address>> {
        let mut ids: Vec<Address> = self
            .store
            .keys_with_prefix(&self.keys.prefix(kind))
            .await?
            .iter()
            .filter_map(|key| self.keys.parse_id(kind, key))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn contains(&self, kind: SecretKind, id: &Address) -> KeyringResult<bool> {
        Ok(self.store.get(&self.keys.secret(kind, id)).await?.is_some())
    }

    async fn load(&self, kind: SecretKind, id: &Address) -> KeyringResult<Option<SecretEnvelope>> {
        let Some(bytes) = self.store.get(&self.keys.secret(kind, id)).await? else {
            return Ok(None);
        };
        SecretEnvelope::deserialize(&bytes)
            .map(Some)
            .map_err(|err| corrupted(kind, id, err.to_string()))
    }

    async fn load_existing(&self, kind: SecretKind, id: &Address) -> KeyringResult<SecretEnvelope> {
        self.load(kind, id)
            .await?
            .ok_or(KeyringError::SecretNotFound { kind, id: *id })
    }

    async fn put(
        &self,
        kind: SecretKind,
        id: &Address,
        envelope: &SecretEnvelope,
    ) -> KeyringResult<()> {
        let entries = BTreeMap::from([(self.keys.secret(kind, id), envelope.serialize()?)]);
        self.store.set(entries).await?;
        Ok(())
    }

    /// The record whose salt every other record shares: the lowest mnemonic
    /// id, or the lowest private key if no mnemonic is stored.
    async fn master_record(&self) -> KeyringResult<Option<(SecretKind, Address, SecretEnvelope)>> {
        for kind in [SecretKind::Mnemonic, SecretKind::PrivateKey] {
            if let Some(id) = self.ids(kind).await?.first().copied() {
                if let Some(envelope) = self.load(kind, &id).await? {
                    return Ok(Some((kind, id, envelope)));
                }
            }
        }
        Ok(None)
    }

    /// Runs the KDF on the blocking pool.
    async fn derive_key(&self, password: &str, params: &MasterParams) -> KeyringResult<MasterKey> {
        let crypto = Arc::clone(&self.crypto);
        let password = Zeroizing::new(password.as_bytes().to_vec());
        let params = params.clone();
        tokio::task::spawn_blocking(move || {
            crypto.derive_key(&password, &params.salt, &params.kdf)
        })
        .await
        .map_err(|err| CryptoError::KeyDerivation(err.to_string()))?
        .map_err(KeyringError::from)
    }

    /// Returns the master key for `password` if it opens `envelope`.
    async fn verify_password(
        &self,
        password: &str,
        kind: SecretKind,
        id: &Address,
        envelope: &SecretEnvelope,
    ) -> Option<MasterKey> {
        let key = self
            .derive_key(password, &MasterParams::of(envelope))
            .await
            .ok()?;
        self.open(&key, kind, id, envelope).ok()?;
        Some(key)
    }

    fn seal(
        &self,
        key: &MasterKey,
        params: &MasterParams,
        kind: SecretKind,
        id: &Address,
        plaintext: &[u8],
    ) -> KeyringResult<SecretEnvelope> {
        let iv = self.crypto.generate_iv();
        let ciphertext = self
            .crypto
            .encrypt(key, &iv, &associated_data(kind, id), plaintext)?;
        Ok(SecretEnvelope::new(
            params.kdf,
            params.salt.clone(),
            iv,
            ciphertext,
        ))
    }

    /// Decrypts a record and checks that the plaintext maps back to `id`.
    fn open(
        &self,
        key: &MasterKey,
        kind: SecretKind,
        id: &Address,
        envelope: &SecretEnvelope,
    ) -> KeyringResult<Zeroizing<String>> {
        let plaintext = self.crypto.decrypt(
            key,
            &envelope.iv,
            &associated_data(kind, id),
            &envelope.ciphertext,
        )?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| corrupted(kind, id, "plaintext is not UTF-8"))?;

        let derived = match kind {
            SecretKind::Mnemonic => hd::derive_address(text, 0),
            SecretKind::PrivateKey => hd::parse_private_key(text)
                .and_then(|private_key| hd::address_from_private_key(private_key.as_slice())),
        }
        .map_err(|err| corrupted(kind, id, err.to_string()))?;

        if derived != *id {
            return Err(corrupted(kind, id, "plaintext does not match its id"));
        }
        Ok(Zeroizing::new(text.to_string()))
    }
}

fn corrupted(kind: SecretKind, id: &Address, reason: impl Into<String>) -> KeyringError {
    KeyringError::CorruptedSecret {
        kind,
        id: *id,
        reason: reason.into(),
    }
}
