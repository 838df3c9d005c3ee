//! Display formatting for terminal output
//!
//! Plain-text tables and detail views for keys, stored items and the
//! security log.

pub mod keys;
pub mod log;

pub use keys::{format_key_details, format_key_list};
pub use log::{format_log_entries, format_storage_keys, format_storage_stats};
