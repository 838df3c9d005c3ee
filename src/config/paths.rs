//! Path management for ledger-vault
//!
//! ## Path Resolution Order
//!
//! 1. `LEDGER_VAULT_DATA_DIR` environment variable (if set)
//! 2. The platform configuration directory for `ledger-vault`
//!    (`~/.config/ledger-vault` on Linux, `~/Library/Application Support/ledger-vault`
//!    on macOS, `%APPDATA%\ledger-vault` on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{VaultError, VaultResult};

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "LEDGER_VAULT_DATA_DIR";

/// Manages all paths used by ledger-vault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Resolve the base directory from the environment or the platform default
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> VaultResult<Self> {
        let base_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Use an explicit base directory (tests, `--data-dir`)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory backing the file key-value store
    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    /// JSONL security log sink
    pub fn security_log(&self) -> PathBuf {
        self.base_dir.join("security.log")
    }

    /// Create the base and store directories
    pub fn ensure_directories(&self) -> VaultResult<()> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| VaultError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.store_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create store directory: {}", e)))?;

        Ok(())
    }

    /// Whether `init` has been run here (settings file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> VaultResult<PathBuf> {
    ProjectDirs::from("", "", "ledger-vault")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| VaultError::Config("Could not determine a home directory".into()))
}
