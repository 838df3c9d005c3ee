//! Text encryption, hashing and password CLI commands

use clap::Subcommand;

use crate::crypto::password::validate_master_password;
use crate::crypto::{EncryptionResult, HashAlgorithm, StrengthLevel};
use crate::error::{VaultError, VaultResult};

use super::{read_arg_or_file, resolve_password, VaultContext};

/// Password utility subcommands
#[derive(Subcommand)]
pub enum PasswordCommands {
    /// Report the strength of a password
    Check {
        /// Password to check (prompted if omitted)
        password: Option<String>,
        /// Also apply the master-password policy
        #[arg(long)]
        master: bool,
    },
    /// Generate a random password
    Generate {
        /// Number of characters
        #[arg(short, long, default_value = "20")]
        length: usize,
    },
}

/// Encrypt text and print the envelope as JSON
pub fn handle_encrypt(ctx: &VaultContext, text: &str, password: Option<String>) -> VaultResult<()> {
    let plaintext = read_arg_or_file(text)?;
    let password = resolve_password(password, "Password: ")?;
    let envelope = ctx.engine.encrypt_text(&plaintext, &password)?;
    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| VaultError::Json(format!("Failed to serialize envelope: {}", e)))?;
    println!("{}", json);
    Ok(())
}

/// Decrypt an envelope given as JSON (or `@file`) and print the text
pub fn handle_decrypt(
    ctx: &VaultContext,
    envelope: &str,
    password: Option<String>,
) -> VaultResult<()> {
    let json = read_arg_or_file(envelope)?;
    let envelope: EncryptionResult = serde_json::from_str(&json)
        .map_err(|e| VaultError::InvalidInput(format!("Invalid envelope: {}", e)))?;
    let password = resolve_password(password, "Password: ")?;
    let plaintext = ctx.engine.decrypt_text(&envelope, &password)?;
    println!("{}", plaintext.as_str());
    Ok(())
}

/// Print the hex digest of text (or `@file`)
pub fn handle_hash(ctx: &VaultContext, data: &str, algorithm: &str) -> VaultResult<()> {
    let algorithm: HashAlgorithm = algorithm.parse()?;
    let data = read_arg_or_file(data)?;
    println!("{}", ctx.engine.generate_secure_hash(data.as_bytes(), algorithm));
    Ok(())
}

/// Handle password commands
pub fn handle_password_command(ctx: &VaultContext, cmd: PasswordCommands) -> VaultResult<()> {
    match cmd {
        PasswordCommands::Check { password, master } => {
            let password = resolve_password(password, "Password to check: ")?;
            let strength = ctx.engine.check_password_strength(&password);

            let level = match strength.level {
                StrengthLevel::Weak => "weak",
                StrengthLevel::Fair => "fair",
                StrengthLevel::Strong => "strong",
            };
            println!("Strength: {} ({}/5)", level, strength.score);
            let missing = strength.missing();
            if !missing.is_empty() {
                println!("Missing:  {}", missing.join(", "));
            }

            if master {
                match validate_master_password(&password) {
                    Ok(()) => println!("Meets the master-password policy."),
                    Err(e) => println!("Does not meet the master-password policy: {}", e),
                }
            }
            Ok(())
        }
        PasswordCommands::Generate { length } => {
            let password = ctx.engine.generate_secure_password(length)?;
            println!("{}", password.as_str());
            Ok(())
        }
    }
}
