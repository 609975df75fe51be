//! File-backed storage for [`keyring_core`].
//!
//! [`FileSecretStore`] implements
//! [`PersistedSecretStore`](keyring_core::storage::PersistedSecretStore) on a
//! single file with atomic, cross-process serialized batch writes.

mod file_store;
pub use file_store::FileSecretStore;

pub mod lock;
