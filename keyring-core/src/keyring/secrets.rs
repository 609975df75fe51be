use alloy_primitives::Address;
use log::{debug, info, warn};
use secrecy::SecretString;
use zeroize::Zeroizing;

use super::{Keyring, MasterParams};
use crate::{
    crypto::MasterKey,
    error::{KeyringError, KeyringResult},
    hd::{self, HdError, DEFAULT_WORD_COUNT},
    storage::SecretKind,
};

impl Keyring {
    /// Validates and stores a mnemonic, returning its id (the address at
    /// index 0).
    ///
    /// The phrase is stored in its normalized form: lower-case words joined
    /// by single spaces. That is the form
    /// [`retrieve_mnemonic_unlocked`](Self::retrieve_mnemonic_unlocked)
    /// returns, and the id is derived from it.
    ///
    /// On an empty store `password` becomes the keyring password and any
    /// session key left over from removed secrets is dropped, so the keyring
    /// ends up locked. Otherwise the password must be the current one and the
    /// lock state is not changed. Importing a mnemonic that is already stored
    /// returns its id without touching the record.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::Hd`] if the phrase is not a valid mnemonic.
    /// - [`KeyringError::PasswordMismatch`] if the store already holds
    ///   secrets sealed under another password.
    /// - Storage and crypto failures.
    pub async fn import_mnemonic(&self, phrase: &str, password: &str) -> KeyringResult<Address> {
        let _guard = self.op_lock.write().await;
        self.store_mnemonic(phrase, password).await
    }

    /// Generates a fresh 12-word mnemonic and stores it like
    /// [`import_mnemonic`](Self::import_mnemonic).
    ///
    /// # Errors
    ///
    /// Same as [`import_mnemonic`](Self::import_mnemonic).
    pub async fn generate_and_store_mnemonic(&self, password: &str) -> KeyringResult<Address> {
        let _guard = self.op_lock.write().await;
        let phrase = hd::generate_mnemonic(DEFAULT_WORD_COUNT)?;
        self.store_mnemonic(&phrase, password).await
    }

    /// Decrypts a stored mnemonic.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::Locked`] if the keyring is locked.
    /// - [`KeyringError::SecretNotFound`] if no mnemonic has this id.
    /// - [`KeyringError::Crypto`] or [`KeyringError::CorruptedSecret`] if
    ///   the record does not open under the session key.
    pub async fn retrieve_mnemonic_unlocked(&self, id: &Address) -> KeyringResult<SecretString> {
        let _guard = self.op_lock.read().await;
        let phrase = self.reveal(SecretKind::Mnemonic, id).await?;
        Ok(SecretString::from(phrase.as_str()))
    }

    /// Decrypts a stored private key as `0x`-prefixed hex.
    ///
    /// # Errors
    ///
    /// Same as [`retrieve_mnemonic_unlocked`](Self::retrieve_mnemonic_unlocked).
    pub async fn retrieve_private_key_unlocked(
        &self,
        address: &Address,
    ) -> KeyringResult<SecretString> {
        let _guard = self.op_lock.read().await;
        let private_key = self.reveal(SecretKind::PrivateKey, address).await?;
        Ok(SecretString::from(private_key.as_str()))
    }

    /// Derives the addresses `[start, end)` of a stored mnemonic.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::Hd`] with [`HdError::InvalidIndexRange`] if
    ///   `end <= start`.
    /// - Everything [`retrieve_mnemonic_unlocked`](Self::retrieve_mnemonic_unlocked)
    ///   returns.
    pub async fn generate_addresses_for_mnemonic_id(
        &self,
        id: &Address,
        start: u32,
        end: u32,
    ) -> KeyringResult<Vec<Address>> {
        if end <= start {
            return Err(HdError::InvalidIndexRange { start, end }.into());
        }
        let _guard = self.op_lock.read().await;
        let phrase = self.reveal(SecretKind::Mnemonic, id).await?;
        Ok(hd::derive_addresses(&phrase, start, end)?)
    }

    /// Derives the private key at `index` of a stored mnemonic and stores it.
    /// Returns its address.
    ///
    /// # Errors
    ///
    /// Same as [`retrieve_mnemonic_unlocked`](Self::retrieve_mnemonic_unlocked),
    /// plus storage failures on write.
    pub async fn generate_and_store_private_key(
        &self,
        mnemonic_id: &Address,
        index: u32,
    ) -> KeyringResult<Address> {
        let _guard = self.op_lock.write().await;
        self.require_unlocked().await?;

        let envelope = self.load_existing(SecretKind::Mnemonic, mnemonic_id).await?;
        let (address, sealed) = {
            let key = self.session_key().await?;
            let phrase = self.open(&key, SecretKind::Mnemonic, mnemonic_id, &envelope)?;
            let account = hd::derive_account(&phrase, index)?;
            let encoded = hd::encode_private_key(&account.private_key);
            let sealed = self.seal(
                &key,
                &MasterParams::of(&envelope),
                SecretKind::PrivateKey,
                &account.address,
                encoded.as_bytes(),
            )?;
            (account.address, sealed)
        };

        if self.contains(SecretKind::PrivateKey, &address).await? {
            debug!("private key {address} already stored");
            return Ok(address);
        }
        self.put(SecretKind::PrivateKey, &address, &sealed).await?;
        info!("stored private key {address} derived from {mnemonic_id} at index {index}");
        Ok(address)
    }

    /// Stores an externally supplied hex private key and returns its address.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::Locked`] if the keyring is locked, or if the store
    ///   holds no secret whose salt the key could be sealed with.
    /// - [`KeyringError::Hd`] if the key is not valid hex or not a valid
    ///   secp256k1 scalar.
    pub async fn import_private_key(&self, private_key_hex: &str) -> KeyringResult<Address> {
        let _guard = self.op_lock.write().await;
        self.require_unlocked().await?;

        let private_key = hd::parse_private_key(private_key_hex)?;
        let address = hd::address_from_private_key(private_key.as_slice())?;
        if self.contains(SecretKind::PrivateKey, &address).await? {
            debug!("private key {address} already stored");
            return Ok(address);
        }

        let Some((_, _, master)) = self.master_record().await? else {
            warn!("cannot import private key: the store holds no secret to share a salt with");
            return Err(KeyringError::Locked);
        };
        let encoded = hd::encode_private_key(&private_key);
        let sealed = {
            let key = self.session_key().await?;
            self.seal(
                &key,
                &MasterParams::of(&master),
                SecretKind::PrivateKey,
                &address,
                encoded.as_bytes(),
            )?
        };
        self.put(SecretKind::PrivateKey, &address, &sealed).await?;
        info!("imported private key {address}");
        Ok(address)
    }

    /// Derives the address at `index` of a caller-supplied phrase.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::Hd`] for an invalid phrase or index.
    pub fn generate_address_for_mnemonic(phrase: &str, index: u32) -> KeyringResult<Address> {
        Ok(hd::derive_address(phrase, index)?)
    }

    /// Derives the addresses `[start, end)` of a caller-supplied phrase.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::Hd`] for an invalid phrase or range.
    pub fn generate_addresses_for_mnemonic(
        phrase: &str,
        start: u32,
        end: u32,
    ) -> KeyringResult<Vec<Address>> {
        Ok(hd::derive_addresses(phrase, start, end)?)
    }
}

impl Keyring {
    async fn store_mnemonic(&self, phrase: &str, password: &str) -> KeyringResult<Address> {
        let mnemonic = hd::parse_mnemonic(phrase)?;
        let normalized = Zeroizing::new(mnemonic.to_string());
        let id = hd::derive_address(&normalized, 0)?;

        if self.contains(SecretKind::Mnemonic, &id).await? {
            debug!("mnemonic {id} already stored");
            return Ok(id);
        }

        let (key, params) = self.master_key_for(password).await?;
        let sealed = self.seal(&key, &params, SecretKind::Mnemonic, &id, normalized.as_bytes())?;
        drop(key);
        self.put(SecretKind::Mnemonic, &id, &sealed).await?;
        info!("imported mnemonic {id}");
        Ok(id)
    }

    /// Derives the master key for `password`, checking it against the
    /// existing records. An empty store gets a fresh salt and loses any
    /// stale session key.
    async fn master_key_for(&self, password: &str) -> KeyringResult<(MasterKey, MasterParams)> {
        if let Some((kind, id, envelope)) = self.master_record().await? {
            let key = self
                .verify_password(password, kind, &id, &envelope)
                .await
                .ok_or(KeyringError::PasswordMismatch)?;
            return Ok((key, MasterParams::of(&envelope)));
        }

        // a session key from removed secrets cannot open the new salt
        if self.session.get(&self.keys.session()).await?.is_some() {
            debug!("dropping stale session key of an empty store");
            self.session.remove(&self.keys.session()).await?;
        }

        let params = MasterParams {
            kdf: self.config.kdf,
            salt: self.crypto.generate_salt(),
        };
        let key = self.derive_key(password, &params).await?;
        Ok((key, params))
    }

    /// Opens a stored secret with the session key.
    async fn reveal(&self, kind: SecretKind, id: &Address) -> KeyringResult<Zeroizing<String>> {
        self.require_unlocked().await?;
        let envelope = self.load_existing(kind, id).await?;
        let key = self.session_key().await?;
        self.open(&key, kind, id, &envelope)
    }
}
