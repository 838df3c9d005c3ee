//! Configuration module for ledger-vault
//!
//! - Platform path resolution with an environment override
//! - JSON settings persistence

pub mod paths;
pub mod settings;

pub use paths::{VaultPaths, DATA_DIR_ENV};
pub use settings::{KeySettings, SecurityLogSettings, Settings, StorageSettings};
