//! Secure storage CLI commands

use std::path::PathBuf;

use chrono::Duration;
use clap::Subcommand;
use serde_json::Value;

use crate::display::{format_storage_keys, format_storage_stats};
use crate::error::{VaultError, VaultResult};
use crate::vault::StoreOptions;

use super::{read_arg_or_file, resolve_new_password, resolve_password, write_or_print, VaultContext};

/// Secure storage subcommands
#[derive(Subcommand)]
pub enum StoreCommands {
    /// Encrypt and store a JSON value
    Put {
        /// Storage key
        key: String,
        /// JSON value, or @path
        json: String,
        /// Store the payload uncompressed
        #[arg(long)]
        no_compress: bool,
        /// Hours until the item expires
        #[arg(long)]
        ttl_hours: Option<u32>,
        /// Associate the item with a key-manager key
        #[arg(long)]
        key_id: Option<String>,
    },
    /// Decrypt and print a stored value
    Get {
        /// Storage key
        key: String,
    },
    /// Remove a stored item
    Remove {
        /// Storage key
        key: String,
    },
    /// List storage keys
    List,
    /// Remove expired items
    Cleanup,
    /// Re-encrypt an item under a new password
    Passwd {
        /// Storage key
        key: String,
        /// New password (prompted if omitted)
        #[arg(long, env = "LEDGER_VAULT_NEW_PASSWORD", hide_env_values = true)]
        new_password: Option<String>,
    },
    /// Export every item (still encrypted) as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import items from an export; existing keys are skipped
    Import {
        /// Export JSON, or @path
        input: String,
    },
    /// Show item counts and sizes
    Stats,
}

/// Handle secure storage commands
pub fn handle_store_command(
    ctx: &VaultContext,
    password: Option<String>,
    cmd: StoreCommands,
) -> VaultResult<()> {
    let storage = ctx.secure_storage();

    match cmd {
        StoreCommands::Put {
            key,
            json,
            no_compress,
            ttl_hours,
            key_id,
        } => {
            let raw = read_arg_or_file(&json)?;
            let value: Value = serde_json::from_str(&raw)
                .map_err(|e| VaultError::InvalidInput(format!("Invalid JSON value: {}", e)))?;

            let mut options =
                StoreOptions::default().compression(!no_compress && ctx.settings.storage.compression);
            if let Some(hours) = ttl_hours.or(ctx.settings.storage.default_ttl_hours) {
                options = options.ttl(Duration::hours(i64::from(hours)))?;
            }
            if let Some(key_id) = key_id {
                options = options.key_id(key_id);
            }

            let password = resolve_password(password, "Password: ")?;
            let id = storage.store(&key, &value, &password, options)?;
            println!("Stored {} ({})", key, id);
        }
        StoreCommands::Get { key } => {
            let password = resolve_password(password, "Password: ")?;
            let value: Value = storage.retrieve(&key, &password)?;
            let json = serde_json::to_string_pretty(&value)
                .map_err(|e| VaultError::Json(format!("Failed to format value: {}", e)))?;
            println!("{}", json);
        }
        StoreCommands::Remove { key } => {
            if storage.remove(&key)? {
                println!("Removed {}", key);
            } else {
                return Err(VaultError::NotFound(key));
            }
        }
        StoreCommands::List => {
            println!("{}", format_storage_keys(&storage.list_keys()?).trim_end());
        }
        StoreCommands::Cleanup => {
            let removed = storage.cleanup_expired()?;
            println!("Removed {} expired item(s)", removed);
        }
        StoreCommands::Passwd { key, new_password } => {
            let old = resolve_password(password, "Current password: ")?;
            let new = resolve_new_password(new_password, "New password: ")?;
            storage.update_password(&key, &old, &new)?;
            println!("Password updated for {}", key);
        }
        StoreCommands::Export { output } => {
            let json = storage.export_data()?;
            write_or_print(output.as_deref(), &json)?;
        }
        StoreCommands::Import { input } => {
            let json = read_arg_or_file(&input)?;
            let summary = storage.import_data(&json)?;
            println!(
                "Imported {} item(s) ({} skipped)",
                summary.imported.len(),
                summary.skipped.len()
            );
        }
        StoreCommands::Stats => {
            println!("{}", format_storage_stats(&storage.stats()?).trim_end());
        }
    }

    Ok(())
}
