//! Key manager CLI commands
//!
//! Each invocation opens a session with the master password (from
//! `--master-password`, `LEDGER_VAULT_MASTER_PASSWORD` or a prompt) and
//! runs one operation.

use std::path::PathBuf;

use clap::Subcommand;

use crate::display::{format_key_details, format_key_list};
use crate::error::VaultResult;
use crate::keys::{KeyId, KeyMetadata, DEFAULT_EXPIRY_WINDOW_DAYS};

use super::{read_arg_or_file, resolve_new_password, resolve_password, write_or_print, VaultContext};

/// Key subcommands
#[derive(Subcommand)]
pub enum KeysCommands {
    /// Generate a new key
    Generate {
        /// Key name
        name: String,
        /// What the key is used for
        #[arg(short, long, default_value = "general")]
        purpose: String,
        /// Owning user or system
        #[arg(short, long, default_value = "default")]
        owner: String,
        /// Generate a signing key pair instead of a symmetric key
        #[arg(long)]
        asymmetric: bool,
        /// Requested strength of a key pair (RSA-equivalent bits)
        #[arg(long)]
        key_size: Option<u32>,
        /// Days until the key expires
        #[arg(short, long)]
        expires_days: Option<u32>,
        /// Permission labels (repeatable)
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    /// List all keys
    List,
    /// Show key details
    Show {
        /// Key ID
        id: String,
    },
    /// Print a key's decrypted material
    Get {
        /// Key ID
        id: String,
    },
    /// Print the public key of a key pair
    Public {
        /// Key ID
        id: String,
    },
    /// Delete a key
    Delete {
        /// Key ID
        id: String,
    },
    /// Replace a key with fresh material
    Rotate {
        /// Key ID
        id: String,
    },
    /// List keys expiring soon
    Expiring {
        /// Look-ahead window in days
        #[arg(short, long, default_value_t = DEFAULT_EXPIRY_WINDOW_DAYS)]
        days: u32,
    },
    /// Re-encrypt every key under a new master password
    ChangeMaster {
        /// New master password (prompted if omitted)
        #[arg(long, env = "LEDGER_VAULT_NEW_MASTER_PASSWORD", hide_env_values = true)]
        new_password: Option<String>,
    },
    /// Export all keys (still encrypted) as JSON
    Export {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Import keys from an export; existing ids are skipped
    Import {
        /// Export JSON, or @path
        input: String,
    },
}

/// Handle key commands
pub fn handle_keys_command(
    ctx: &VaultContext,
    master_password: Option<String>,
    cmd: KeysCommands,
) -> VaultResult<()> {
    let manager = ctx.key_manager();
    let master = resolve_password(master_password, "Master password: ")?;
    let mut session = manager.initialize(&master)?;

    match cmd {
        KeysCommands::Generate {
            name,
            purpose,
            owner,
            asymmetric,
            key_size,
            expires_days,
            permissions,
        } => {
            let mut metadata = KeyMetadata::new(purpose, owner);
            metadata.permissions = permissions;
            let expires_days = expires_days.or(ctx.settings.keys.default_expiration_days);

            let id = if asymmetric {
                let size = key_size.unwrap_or(ctx.settings.keys.default_key_size);
                manager.generate_asymmetric_key_pair(&session, &name, metadata, size, expires_days)?
            } else {
                manager.generate_symmetric_key(&session, &name, metadata, expires_days)?
            };
            println!("Generated key: {}", id);
        }
        KeysCommands::List => {
            println!("{}", format_key_list(&manager.list_keys(&session)?));
        }
        KeysCommands::Show { id } => {
            let info = manager.get_key_info(&session, &KeyId::from(id))?;
            println!("{}", format_key_details(&info));
        }
        KeysCommands::Get { id } => {
            let key = manager.get_key(&session, &KeyId::from(id))?;
            println!("{}", key.as_str());
        }
        KeysCommands::Public { id } => {
            println!("{}", manager.get_public_key(&session, &KeyId::from(id))?);
        }
        KeysCommands::Delete { id } => {
            let id = KeyId::from(id);
            manager.delete_key(&session, &id)?;
            println!("Deleted key: {}", id);
        }
        KeysCommands::Rotate { id } => {
            let old = KeyId::from(id);
            let new = manager.rotate_key(&session, &old)?;
            println!("Rotated {} -> {}", old, new);
        }
        KeysCommands::Expiring { days } => {
            let keys = manager.get_expiring_keys(&session, days)?;
            if keys.is_empty() {
                println!("No keys expire within {} days.", days);
            } else {
                println!("{}", format_key_list(&keys));
            }
        }
        KeysCommands::ChangeMaster { new_password } => {
            let new_password = resolve_new_password(new_password, "New master password: ")?;
            manager.change_master_password(&mut session, &master, &new_password)?;
            println!("Master password changed.");
        }
        KeysCommands::Export { output } => {
            let json = manager.export_keys(&session)?;
            write_or_print(output.as_deref(), &json)?;
        }
        KeysCommands::Import { input } => {
            let json = read_arg_or_file(&input)?;
            let summary = manager.import_keys(&session, &json)?;
            println!(
                "Imported {} keys ({} skipped, {} rejected)",
                summary.imported.len(),
                summary.skipped.len(),
                summary.rejected.len()
            );
            for id in &summary.rejected {
                println!("  rejected: {} (does not open with the current master password)", id);
            }
        }
    }

    Ok(())
}
