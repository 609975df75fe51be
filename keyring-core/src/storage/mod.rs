//! Storage collaborators: interfaces, record format and key namespacing.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod memory;
pub mod traits;

pub use envelope::SecretEnvelope;
pub use error::{StorageError, StorageResult};
pub use keys::{associated_data, SecretKind, StorageKeys};
pub use memory::{MemorySecretStore, MemorySessionCache};
pub use traits::{PersistedSecretStore, SessionKeyCache};
