//! ledger-vault - local encryption and key lifecycle management
//!
//! This library provides password-based encryption of text, bytes, files
//! and JSON records, a master-password-protected key manager, and a bounded
//! security log that records every security-relevant operation.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `crypto`: Primitives adapter and the crypto engine (envelopes, KDF,
//!   signatures, hashes, password utilities)
//! - `audit`: Security event log
//! - `keys`: Key manager (generation, rotation, expiry, export/import)
//! - `vault`: Secure storage of serializable records
//! - `files`: Whole-file encryption with checksums and batch processing
//! - `storage`: Key-value persistence and atomic file I/O
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledger_vault::audit::SecurityLog;
//! use ledger_vault::crypto::CryptoEngine;
//!
//! let engine = CryptoEngine::new(Arc::new(SecurityLog::new()));
//! let envelope = engine.encrypt_text("account 4411", "Tr0ub4dor&3xyz")?;
//! let text = engine.decrypt_text(&envelope, "Tr0ub4dor&3xyz")?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod files;
pub mod keys;
pub mod storage;
pub mod vault;

pub use audit::SecurityLog;
pub use crypto::CryptoEngine;
pub use error::{ErrorKind, VaultError, VaultResult};
pub use files::FileEncryption;
pub use keys::{KeyManager, KeySession};
pub use vault::SecureStorage;
