use std::collections::BTreeMap;

use log::{info, warn};

use super::{Keyring, LockState, MasterParams};
use crate::{
    error::{KeyringError, KeyringResult},
    storage::SecretKind,
};

impl Keyring {
    /// Re-seals every stored secret under a key derived from `new_password`.
    ///
    /// Every record is opened with the session key before anything is
    /// written. If any record fails to open, or the store is empty, nothing is
    /// written, the session is left alone and `Ok(false)` is returned. The new records are committed with a single batched
    /// [`set`](crate::storage::PersistedSecretStore::set), then the session
    /// cache is switched to the new key.
    ///
    /// # Errors
    ///
    /// - [`KeyringError::Locked`] if the keyring is locked.
    /// - Storage failures, including a failed commit. The session key is only
    ///   replaced after the commit succeeds.
    pub async fn change_password(&self, new_password: &str) -> KeyringResult<bool> {
        let _guard = self.op_lock.write().await;
        self.require_unlocked().await?;

        let mut plaintexts = Vec::new();
        for kind in [SecretKind::Mnemonic, SecretKind::PrivateKey] {
            for id in self.ids(kind).await? {
                let envelope = match self.load(kind, &id).await {
                    Ok(Some(envelope)) => envelope,
                    Ok(None) => continue,
                    Err(KeyringError::Storage(err)) => return Err(err.into()),
                    Err(err) => {
                        warn!("password change aborted: {err}");
                        return Ok(false);
                    }
                };
                let key = self.session_key().await?;
                match self.open(&key, kind, &id, &envelope) {
                    Ok(plaintext) => plaintexts.push((kind, id, plaintext)),
                    Err(err) => {
                        warn!("password change aborted: {kind} {id} does not open: {err}");
                        return Ok(false);
                    }
                }
            }
        }

        if plaintexts.is_empty() {
            warn!("password change aborted: the store is empty");
            return Ok(false);
        }

        let params = MasterParams {
            kdf: self.config.kdf,
            salt: self.crypto.generate_salt(),
        };
        let new_key = self.derive_key(new_password, &params).await?;

        let mut staged = BTreeMap::new();
        for (kind, id, plaintext) in &plaintexts {
            let sealed = self.seal(&new_key, &params, *kind, id, plaintext.as_bytes())?;
            staged.insert(self.keys.secret(*kind, id), sealed.serialize()?);
        }
        drop(plaintexts);

        self.store.set(staged).await?;
        self.session
            .set(&self.keys.session(), self.crypto.export_key(&new_key))
            .await?;
        info!("password changed");
        Ok(true)
    }

    /// Returns `true` if the keyring is unlocked and `password` derives the
    /// live master key. The comparison is constant-time.
    ///
    /// # Errors
    ///
    /// Returns storage failures and [`KeyringError::InvalidSessionKey`].
    pub async fn check_password(&self, password: &str) -> KeyringResult<bool> {
        let _guard = self.op_lock.read().await;
        if self.current_state().await? == LockState::Locked {
            return Ok(false);
        }
        let Some((_, _, envelope)) = self.master_record().await? else {
            return Ok(false);
        };

        let Ok(candidate) = self
            .derive_key(password, &MasterParams::of(&envelope))
            .await
        else {
            return Ok(false);
        };
        let live = match self.session_key().await {
            Ok(live) => live,
            Err(KeyringError::Locked) => return Ok(false),
            Err(err) => return Err(err),
        };
        Ok(candidate.ct_matches(&live))
    }
}
