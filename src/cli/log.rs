//! Security log CLI command

use clap::Args;

use crate::audit::{read_log_file, LogStatus};
use crate::display::format_log_entries;
use crate::error::{VaultError, VaultResult};

use super::VaultContext;

/// Options for `log`
#[derive(Args)]
pub struct LogArgs {
    /// Number of most recent entries to show
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
    /// Only show failed operations
    #[arg(long)]
    pub failures: bool,
    /// Print entries as a JSON array
    #[arg(long)]
    pub json: bool,
}

/// Show the persisted security log
pub fn handle_log_command(ctx: &VaultContext, args: LogArgs) -> VaultResult<()> {
    let mut entries = read_log_file(&ctx.paths.security_log())?;
    if args.failures {
        entries.retain(|e| matches!(e.status, LogStatus::Failure | LogStatus::Error));
    }
    let start = entries.len().saturating_sub(args.limit);
    let entries = &entries[start..];

    if args.json {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| VaultError::Json(format!("Failed to serialize log: {}", e)))?;
        println!("{}", json);
    } else {
        println!("{}", format_log_entries(entries).trim_end());
    }
    Ok(())
}
