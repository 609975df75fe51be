//! Keyring configuration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{KeyringError, KeyringResult};

/// Namespace used when the host does not provide one.
pub const DEFAULT_NAMESPACE: &str = "keyring";

/// Argon2id cost parameters used to derive the master key from a password.
///
/// The parameters a record was sealed with are stored alongside it, so
/// changing these only affects newly sealed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB. Must be at least `8 * p_cost`.
    pub m_cost: u32,
    /// Number of passes. Must be at least 1.
    pub t_cost: u32,
    /// Degree of parallelism. Must be at least 1.
    pub p_cost: u32,
}

impl KdfParams {
    /// Returns the parameters for a named preset.
    #[must_use]
    pub const fn preset(preset: KdfPreset) -> Self {
        match preset {
            KdfPreset::Production => Self {
                m_cost: 65_536,
                t_cost: 3,
                p_cost: 1,
            },
            KdfPreset::Interactive => Self {
                m_cost: 19_456,
                t_cost: 2,
                p_cost: 1,
            },
            KdfPreset::Testing => Self {
                m_cost: 64,
                t_cost: 1,
                p_cost: 1,
            },
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::preset(KdfPreset::Production)
    }
}

/// Canned KDF cost levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum KdfPreset {
    /// 64 MiB, 3 passes.
    Production,
    /// 19 MiB, 2 passes. For hosts where unlock latency matters more.
    Interactive,
    /// Minimal cost. Never use outside of tests.
    Testing,
}

/// Top-level keyring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    /// Prefix for every storage key written by the keyring.
    pub namespace: String,
    /// KDF parameters used when sealing new records.
    pub kdf: KdfParams,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kdf: KdfParams::default(),
        }
    }
}

impl KeyringConfig {
    /// Creates a configuration with the given namespace and preset.
    #[must_use]
    pub fn new(namespace: impl Into<String>, preset: KdfPreset) -> Self {
        Self {
            namespace: namespace.into(),
            kdf: KdfParams::preset(preset),
        }
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfig`] if the JSON is malformed or the
    /// namespace is empty.
    pub fn from_json(json: &str) -> KeyringResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| KeyringError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the keyring cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`KeyringError::InvalidConfig`] on an empty or dotted
    /// namespace, or on zero KDF costs.
    pub fn validate(&self) -> KeyringResult<()> {
        if self.namespace.is_empty() {
            return Err(KeyringError::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.namespace.ends_with('.') {
            return Err(KeyringError::InvalidConfig(
                "namespace must not end with '.'".to_string(),
            ));
        }
        if self.kdf.t_cost == 0 || self.kdf.p_cost == 0 {
            return Err(KeyringError::InvalidConfig(
                "kdf t_cost and p_cost must be at least 1".to_string(),
            ));
        }
        if self.kdf.m_cost < 8 * self.kdf.p_cost {
            return Err(KeyringError::InvalidConfig(format!(
                "kdf m_cost must be at least {}",
                8 * self.kdf.p_cost
            )));
        }
        Ok(())
    }
}
