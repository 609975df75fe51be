//! Encrypted local secret store for an HD wallet.
//!
//! The [`Keyring`] keeps BIP-39 mnemonics and secp256k1 private keys sealed
//! at rest under a single password-derived master key. The master key only
//! lives in a [`SessionKeyCache`](storage::SessionKeyCache) between
//! [`Keyring::unlock`] and [`Keyring::lock`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keyring_core::{
//!     storage::{MemorySecretStore, MemorySessionCache},
//!     Keyring, KeyringConfig,
//! };
//!
//! # async fn run() -> keyring_core::KeyringResult<()> {
//! let keyring = Keyring::new(
//!     KeyringConfig::default(),
//!     Arc::new(MemorySecretStore::new()),
//!     Arc::new(MemorySessionCache::new()),
//! )?;
//!
//! let id = keyring
//!     .import_mnemonic("test test test test test test test test test test test junk", "pw")
//!     .await?;
//! assert!(keyring.unlock("pw").await?);
//! let addresses = keyring.generate_addresses_for_mnemonic_id(&id, 0, 5).await?;
//! # let _ = addresses;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub use config::{KdfParams, KdfPreset, KeyringConfig};

pub mod crypto;

mod error;
pub use error::*;

pub mod hd;

pub mod logger;

pub mod storage;
pub use storage::SecretKind;

mod keyring;
pub use keyring::{Keyring, LockState};
