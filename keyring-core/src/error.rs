use alloy_primitives::Address;
use thiserror::Error;

use crate::{crypto::CryptoError, hd::HdError, storage::StorageError, SecretKind};

/// Result type for keyring operations.
pub type KeyringResult<T> = Result<T, KeyringError>;

/// Errors surfaced by the [`Keyring`](crate::Keyring).
///
/// Wrong-password outcomes are not errors: `unlock` and `change_password`
/// report them as `Ok(false)`. Everything here is either a caller bug, a
/// broken invariant or a storage failure.
#[derive(Debug, Error)]
pub enum KeyringError {
    /// An unlocked-only operation was called while locked.
    #[error("keyring is locked")]
    Locked,

    /// Mnemonic or HD derivation failure.
    #[error(transparent)]
    Hd(#[from] HdError),

    /// Key derivation or AEAD failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Storage collaborator failure, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No secret of this kind is stored under `id`.
    #[error("{kind} not found: {id}")]
    SecretNotFound {
        /// Kind of the missing secret.
        kind: SecretKind,
        /// Requested id.
        id: Address,
    },

    /// A stored secret decrypted but does not match its own id, or its record
    /// is malformed.
    #[error("{kind} {id} is corrupted: {reason}")]
    CorruptedSecret {
        /// Kind of the corrupted secret.
        kind: SecretKind,
        /// Id of the corrupted secret.
        id: Address,
        /// What was wrong with it.
        reason: String,
    },

    /// The password does not open the secrets already in the store.
    #[error("password does not match the existing keyring")]
    PasswordMismatch,

    /// The session slot holds something that is not a valid exported key.
    #[error("invalid session key")]
    InvalidSessionKey,

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
