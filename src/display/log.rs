//! Security log and storage display formatting

use crate::audit::SecurityLogEntry;
use crate::vault::StorageStats;

/// Format log entries one per line, oldest first
pub fn format_log_entries(entries: &[SecurityLogEntry]) -> String {
    if entries.is_empty() {
        return "No security events recorded.".to_string();
    }

    let mut output = String::new();
    for entry in entries {
        output.push_str(&entry.format_human_readable());
        output.push('\n');
    }
    output
}

/// Format storage keys as a simple list
pub fn format_storage_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        return "No stored items.".to_string();
    }
    keys.iter().map(|k| format!("  {}\n", k)).collect()
}

pub fn format_storage_stats(stats: &StorageStats) -> String {
    let mut output = String::new();
    output.push_str("Secure storage\n");
    output.push_str(&format!("  Items:           {}\n", stats.item_count));
    output.push_str(&format!("  Compressed:      {}\n", stats.compressed_count));
    output.push_str(&format!("  Expired:         {}\n", stats.expired_count));
    output.push_str(&format!(
        "  Original size:   {} bytes\n",
        stats.total_original_size
    ));
    output.push_str(&format!(
        "  Encrypted size:  {} bytes\n",
        stats.total_encrypted_size
    ));
    output
}
