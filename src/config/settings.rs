//! User settings for ledger-vault
//!
//! Persistence namespace, Argon2id cost, security-log retention and the
//! defaults applied to new keys and stored items.

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::audit::DEFAULT_CAPACITY;
use crate::crypto::{KdfParams, DEFAULT_KEY_SIZE};
use crate::error::{VaultError, VaultResult};
use crate::storage::write_json_atomic;

/// Security log retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityLogSettings {
    /// Entries kept in memory
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,

    /// Append entries to `security.log`
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for SecurityLogSettings {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
            persist: true,
        }
    }
}

/// Defaults for generated keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySettings {
    /// Expiration applied when none is given; `None` means keys never expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expiration_days: Option<u32>,

    /// Requested strength for asymmetric keys (RSA-equivalent bits)
    #[serde(default = "default_key_size")]
    pub default_key_size: u32,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            default_expiration_days: None,
            default_key_size: default_key_size(),
        }
    }
}

/// Defaults for secure storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_true")]
    pub compression: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl_hours: Option<u32>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            compression: true,
            default_ttl_hours: None,
        }
    }
}

/// User settings for ledger-vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Prefix for every persisted key
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub kdf: KdfParams,

    #[serde(default)]
    pub security_log: SecurityLogSettings,

    #[serde(default)]
    pub keys: KeySettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_namespace() -> String {
    "ledger_vault.".to_string()
}

fn default_log_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_key_size() -> u32 {
    DEFAULT_KEY_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            namespace: default_namespace(),
            kdf: KdfParams::default(),
            security_log: SecurityLogSettings::default(),
            keys: KeySettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    ///
    /// Defaults are not written; the caller decides when to persist.
    pub fn load_or_create(paths: &VaultPaths) -> VaultResult<Self> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| VaultError::Config(format!("Failed to parse settings file: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> VaultResult<()> {
        self.validate()?;
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    fn validate(&self) -> VaultResult<()> {
        let valid_namespace = !self.namespace.is_empty()
            && self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid_namespace {
            return Err(VaultError::Config(format!(
                "Invalid namespace: {:?}",
                self.namespace
            )));
        }
        self.kdf
            .check_bounds()
            .map_err(|e| VaultError::Config(e.to_string()))?;
        if self.security_log.capacity == 0 {
            return Err(VaultError::Config(
                "Security log capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
