use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ledger_vault::cli::{
    handle_file_command, handle_keys_command, handle_log_command, handle_password_command,
    handle_store_command, VaultContext, MASTER_PASSWORD_ENV, PASSWORD_ENV,
};
use ledger_vault::config::{Settings, VaultPaths, DATA_DIR_ENV};

#[derive(Parser)]
#[command(
    name = "ledger-vault",
    author = "Kaylee Beyene",
    version,
    about = "Local encryption and key management for customer and billing records",
    long_about = "ledger-vault encrypts text, files and JSON records under passwords, \
                  manages a master-password-protected set of symmetric and signing keys, \
                  and keeps an append-only log of every security-relevant operation."
)]
struct Cli {
    /// Base directory for settings, stored data and the security log
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and default settings
    Init,

    /// Show current configuration and paths
    Config,

    /// Encrypt text and print the envelope as JSON
    Encrypt {
        /// Text to encrypt, or @path
        text: String,
        /// Password (prompted if omitted)
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt an envelope and print the text
    Decrypt {
        /// Envelope JSON, or @path
        envelope: String,
        /// Password (prompted if omitted)
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,
    },

    /// Print the hex digest of text
    Hash {
        /// Text to hash, or @path
        data: String,
        /// SHA-256, SHA-384 or SHA-512
        #[arg(short, long, default_value = "SHA-256")]
        algorithm: String,
    },

    /// Password strength and generation
    #[command(subcommand)]
    Password(ledger_vault::cli::PasswordCommands),

    /// Key management
    Keys {
        /// Master password (prompted if omitted)
        #[arg(long, env = MASTER_PASSWORD_ENV, hide_env_values = true)]
        master_password: Option<String>,
        #[command(subcommand)]
        command: ledger_vault::cli::KeysCommands,
    },

    /// Encrypted JSON storage
    Store {
        /// Item password (prompted if omitted)
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,
        #[command(subcommand)]
        command: ledger_vault::cli::StoreCommands,
    },

    /// File encryption
    File {
        /// Password (prompted if omitted)
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,
        #[command(subcommand)]
        command: ledger_vault::cli::FileCommands,
    },

    /// Show the security log
    Log(ledger_vault::cli::LogArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => VaultPaths::with_base_dir(dir),
        None => VaultPaths::new()?,
    };

    match cli.command {
        Some(Commands::Init) => {
            let already = paths.is_initialized();
            let settings = Settings::load_or_create(&paths)?;
            settings.save(&paths)?;
            if already {
                println!("Already initialized at: {}", paths.base_dir().display());
            } else {
                println!("Initialized ledger-vault at: {}", paths.base_dir().display());
            }
        }
        Some(Commands::Config) => {
            let settings = Settings::load_or_create(&paths)?;
            println!("ledger-vault Configuration");
            println!("==========================");
            println!("Base directory:  {}", paths.base_dir().display());
            println!("Settings file:   {}", paths.settings_file().display());
            println!("Store directory: {}", paths.store_dir().display());
            println!("Security log:    {}", paths.security_log().display());
            println!("Initialized:     {}", paths.is_initialized());
            println!();
            println!("Settings:");
            println!("  Namespace:          {}", settings.namespace);
            println!(
                "  KDF:                Argon2id m={} KiB, t={}, p={}",
                settings.kdf.memory_cost, settings.kdf.time_cost, settings.kdf.parallelism
            );
            println!("  Log capacity:       {}", settings.security_log.capacity);
            println!("  Log persisted:      {}", settings.security_log.persist);
            println!("  Default key size:   {}", settings.keys.default_key_size);
            println!("  Compression:        {}", settings.storage.compression);
        }
        Some(Commands::Encrypt { text, password }) => {
            let ctx = VaultContext::open(paths)?;
            ledger_vault::cli::crypto::handle_encrypt(&ctx, &text, password)?;
        }
        Some(Commands::Decrypt { envelope, password }) => {
            let ctx = VaultContext::open(paths)?;
            ledger_vault::cli::crypto::handle_decrypt(&ctx, &envelope, password)?;
        }
        Some(Commands::Hash { data, algorithm }) => {
            let ctx = VaultContext::open(paths)?;
            ledger_vault::cli::crypto::handle_hash(&ctx, &data, &algorithm)?;
        }
        Some(Commands::Password(cmd)) => {
            let ctx = VaultContext::open(paths)?;
            handle_password_command(&ctx, cmd)?;
        }
        Some(Commands::Keys {
            master_password,
            command,
        }) => {
            let ctx = VaultContext::open(paths)?;
            handle_keys_command(&ctx, master_password, command)?;
        }
        Some(Commands::Store { password, command }) => {
            let ctx = VaultContext::open(paths)?;
            handle_store_command(&ctx, password, command)?;
        }
        Some(Commands::File { password, command }) => {
            let ctx = VaultContext::open(paths)?;
            handle_file_command(&ctx, password, command)?;
        }
        Some(Commands::Log(args)) => {
            let ctx = VaultContext::open(paths)?;
            handle_log_command(&ctx, args)?;
        }
        None => {
            println!("ledger-vault - local encryption and key management");
            println!();
            println!("Run 'ledger-vault --help' for usage information.");
            println!("Run 'ledger-vault init' to create the data directory.");
        }
    }

    Ok(())
}
