//! Security event log for ledger-vault
//!
//! Records the outcome of every cryptographic operation in an append-only,
//! capped, queryable log.
//!
//! # Architecture
//!
//! - `SecurityLogEntry`: timestamp, event, status, category details and the
//!   session id of the log that produced it.
//! - `SecurityLog`: bounded in-memory ring (1000 entries by default) with an
//!   optional line-delimited JSON file sink.
//! - `read_log_file`: reads a JSONL sink back for display.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledger_vault::audit::{EventDetails, SecurityEvent, SecurityLog};
//!
//! let log = SecurityLog::new().with_sink(paths.security_log());
//! log.success(SecurityEvent::KeyGenerate, EventDetails::audit(Some(key_id)));
//! ```

mod entry;
mod logger;

pub use entry::{EventDetails, LogStatus, SecurityEvent, SecurityLogEntry};
pub use logger::{read_log_file, LogQuery, SecurityLog, DEFAULT_CAPACITY};
