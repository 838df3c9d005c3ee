//! CLI command handlers
//!
//! Bridges clap argument parsing with the key manager, secure storage and
//! file encryption. Every handler works on a [`VaultContext`] opened from
//! the resolved data directory.

pub mod crypto;
pub mod file;
pub mod keys;
pub mod log;
pub mod store;

use std::sync::Arc;

pub use self::crypto::{handle_password_command, PasswordCommands};
pub use file::{handle_file_command, FileCommands};
pub use keys::{handle_keys_command, KeysCommands};
pub use log::{handle_log_command, LogArgs};
pub use store::{handle_store_command, StoreCommands};

use crate::audit::SecurityLog;
use crate::config::{Settings, VaultPaths};
use crate::crypto::{CryptoEngine, SecureString};
use crate::error::{VaultError, VaultResult};
use crate::files::FileEncryption;
use crate::keys::KeyManager;
use crate::storage::FileStore;
use crate::vault::SecureStorage;

/// Environment variable holding the password for data operations
pub const PASSWORD_ENV: &str = "LEDGER_VAULT_PASSWORD";

/// Environment variable holding the key manager's master password
pub const MASTER_PASSWORD_ENV: &str = "LEDGER_VAULT_MASTER_PASSWORD";

/// Everything a command needs, built from paths and settings
pub struct VaultContext {
    pub paths: VaultPaths,
    pub settings: Settings,
    pub engine: Arc<CryptoEngine>,
    store: Arc<FileStore>,
}

impl VaultContext {
    pub fn open(paths: VaultPaths) -> VaultResult<Self> {
        let settings = Settings::load_or_create(&paths)?;
        paths.ensure_directories()?;

        let mut log = SecurityLog::with_capacity(settings.security_log.capacity);
        if settings.security_log.persist {
            log = log.with_sink(paths.security_log());
        }
        let engine = Arc::new(CryptoEngine::with_kdf(settings.kdf, Arc::new(log)));
        let store = Arc::new(FileStore::new(paths.store_dir())?);

        Ok(Self {
            paths,
            settings,
            engine,
            store,
        })
    }

    pub fn key_manager(&self) -> KeyManager {
        KeyManager::new(
            self.engine.clone(),
            self.store.clone(),
            &self.settings.namespace,
        )
    }

    pub fn secure_storage(&self) -> SecureStorage {
        SecureStorage::new(
            self.engine.clone(),
            self.store.clone(),
            &self.settings.namespace,
        )
    }

    pub fn files(&self) -> FileEncryption {
        FileEncryption::new(self.engine.clone())
    }
}

/// Use a password given on the command line or via the environment, or
/// prompt for one with hidden input
pub fn resolve_password(given: Option<String>, prompt: &str) -> VaultResult<SecureString> {
    match given {
        Some(password) if !password.is_empty() => Ok(SecureString::new(password)),
        _ => prompt_password(prompt),
    }
}

/// Prompt twice for a new password and require both entries to match
pub fn resolve_new_password(given: Option<String>, prompt: &str) -> VaultResult<SecureString> {
    if let Some(password) = given.filter(|p| !p.is_empty()) {
        return Ok(SecureString::new(password));
    }

    let first = prompt_password(prompt)?;
    let second = prompt_password("Confirm password: ")?;
    if first != second {
        return Err(VaultError::InvalidInput("Passwords do not match".into()));
    }
    Ok(first)
}

/// Prompt for a password (hidden input)
fn prompt_password(prompt: &str) -> VaultResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::new)
        .map_err(|e| VaultError::Io(format!("Failed to read password: {}", e)))
}

/// Read a command argument that may name a file with `@path`
pub(crate) fn read_arg_or_file(value: &str) -> VaultResult<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| VaultError::Io(format!("Failed to read {}: {}", path, e))),
        None => Ok(value.to_string()),
    }
}

/// Write to `output` atomically, or print when no path is given
pub(crate) fn write_or_print(output: Option<&std::path::Path>, contents: &str) -> VaultResult<()> {
    match output {
        Some(path) => {
            crate::storage::write_atomic(path, contents.as_bytes())?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}
