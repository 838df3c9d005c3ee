//! Key display formatting
//!
//! Formats key-manager listings for terminal output in table and detail
//! views. Key material never passes through here.

use chrono::{DateTime, Utc};

use crate::keys::KeyInfo;

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Format a list of keys as a table
pub fn format_key_list(keys: &[KeyInfo]) -> String {
    if keys.is_empty() {
        return "No keys found.".to_string();
    }

    let now = Utc::now();
    let id_width = keys.iter().map(|k| k.id.as_str().len()).max().unwrap_or(2).max(2);
    let name_width = keys.iter().map(|k| k.name.len()).max().unwrap_or(4).max(4);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<id_width$}  {:<name_width$}  {:<10}  {:<16}  {:<16}  {}\n",
        "ID",
        "Name",
        "Type",
        "Created",
        "Expires",
        "Status",
        id_width = id_width,
        name_width = name_width,
    ));

    output.push_str(&format!(
        "{:-<id_width$}  {:-<name_width$}  {:-<10}  {:-<16}  {:-<16}  {:-<7}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        id_width = id_width,
        name_width = name_width,
    ));

    for key in keys {
        let status = if key.is_expired_at(now) { "EXPIRED" } else { "" };
        output.push_str(&format!(
            "{:<id_width$}  {:<name_width$}  {:<10}  {:<16}  {:<16}  {}\n",
            key.id,
            key.name,
            key.key_type,
            format_date(Some(key.created_at)),
            format_date(key.expires_at),
            status,
            id_width = id_width,
            name_width = name_width,
        ));
    }

    output
}

/// Format a single key's details
pub fn format_key_details(key: &KeyInfo) -> String {
    let mut output = String::new();

    output.push_str(&format!("Key: {}\n", key.name));
    output.push_str(&format!("  ID:          {}\n", key.id));
    output.push_str(&format!("  Type:        {}\n", key.key_type));
    output.push_str(&format!("  Algorithm:   {}\n", key.algorithm));
    if let Some(size) = key.key_size {
        output.push_str(&format!("  Size:        {} bits\n", size));
    }
    output.push_str(&format!("  Purpose:     {}\n", key.metadata.purpose));
    output.push_str(&format!("  Owner:       {}\n", key.metadata.owner));
    if !key.metadata.permissions.is_empty() {
        output.push_str(&format!(
            "  Permissions: {}\n",
            key.metadata.permissions.join(", ")
        ));
    }
    output.push_str(&format!("  Created:     {}\n", format_date(Some(key.created_at))));
    output.push_str(&format!("  Expires:     {}\n", format_date(key.expires_at)));
    if let Some(public_key) = &key.public_key {
        output.push_str("\n");
        output.push_str(public_key);
    }

    output
}
