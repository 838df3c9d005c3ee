//! File encryption CLI commands
//!
//! `encrypt` writes one `<name>.lvault` JSON bundle per input file;
//! `decrypt` restores the original name inside the output directory.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use crate::error::{VaultError, VaultResult};
use crate::files::{load_encrypted_file, save_encrypted_file, BatchFailure};

use super::{resolve_password, VaultContext};

/// Extension given to encrypted file bundles
pub const BUNDLE_EXTENSION: &str = "lvault";

/// File subcommands
#[derive(Subcommand)]
pub enum FileCommands {
    /// Encrypt text files into bundles
    Encrypt {
        /// Files to encrypt
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Directory for the bundles (defaults to each file's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Decrypt bundles back into files
    Decrypt {
        /// Bundles to decrypt
        #[arg(required = true)]
        bundles: Vec<PathBuf>,
        /// Directory for the restored files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

/// Handle file commands
///
/// Every file is attempted; the command fails afterwards if any did.
pub fn handle_file_command(
    ctx: &VaultContext,
    password: Option<String>,
    cmd: FileCommands,
) -> VaultResult<()> {
    let files = ctx.files();
    let password = resolve_password(password, "Password: ")?;

    match cmd {
        FileCommands::Encrypt { paths, output_dir } => {
            let batch = files.encrypt_files(&paths, &password);
            let mut failed = batch.failed;

            for encrypted in &batch.succeeded {
                let source = paths
                    .iter()
                    .find(|p| p.file_name().is_some_and(|n| *n == *encrypted.original_name))
                    .map(PathBuf::as_path);
                let dir = output_dir
                    .as_deref()
                    .or_else(|| source.and_then(Path::parent))
                    .unwrap_or_else(|| Path::new("."));
                let target = dir.join(format!("{}.{}", encrypted.original_name, BUNDLE_EXTENSION));

                match save_encrypted_file(&target, encrypted) {
                    Ok(()) => println!("Encrypted {} -> {}", encrypted.original_name, target.display()),
                    Err(error) => failed.push(BatchFailure {
                        name: encrypted.original_name.clone(),
                        error,
                    }),
                }
            }

            report_failures(&failed)
        }
        FileCommands::Decrypt { bundles, output_dir } => {
            let mut failed = Vec::new();
            let mut loaded = Vec::new();
            for path in &bundles {
                match load_encrypted_file(path) {
                    Ok(file) => loaded.push(file),
                    Err(error) => failed.push(BatchFailure {
                        name: path.display().to_string(),
                        error,
                    }),
                }
            }

            let batch = files.decrypt_batch(&loaded, &password);
            failed.extend(batch.failed);

            for decrypted in &batch.succeeded {
                let target = output_dir.join(&decrypted.name);
                match crate::storage::write_atomic(&target, decrypted.content.as_bytes()) {
                    Ok(()) => println!("Decrypted {} -> {}", decrypted.name, target.display()),
                    Err(error) => failed.push(BatchFailure {
                        name: decrypted.name.clone(),
                        error,
                    }),
                }
            }

            report_failures(&failed)
        }
    }
}

fn report_failures(failed: &[BatchFailure]) -> VaultResult<()> {
    if failed.is_empty() {
        return Ok(());
    }
    for failure in failed {
        eprintln!("Failed {}: {}", failure.name, failure.error);
    }
    Err(VaultError::InvalidInput(format!(
        "{} file(s) could not be processed",
        failed.len()
    )))
}
