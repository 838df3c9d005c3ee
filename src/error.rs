//! Custom error types for ledger-vault
//!
//! Every public operation returns either a value or a `VaultError`. Each
//! variant maps onto a closed `ErrorKind` which is what the security log
//! records, so callers never need to match on message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    AuthenticationFailure,
    IntegrityFailure,
    KeyNotFound,
    KeyExpired,
    NotInitialized,
    InvalidMasterPassword,
    Expired,
    NotFound,
    InvalidKey,
    PolicyViolation,
    CorruptedFile,
    UnsupportedEnvironment,
    Io,
    Json,
    Storage,
    Config,
    Worker,
}

impl ErrorKind {
    /// Failures that indicate a wrong secret or tampered data
    ///
    /// These are logged with `failure` status; everything else is `error`.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::AuthenticationFailure
                | ErrorKind::IntegrityFailure
                | ErrorKind::InvalidMasterPassword
                | ErrorKind::CorruptedFile
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::AuthenticationFailure => "authentication_failure",
            ErrorKind::IntegrityFailure => "integrity_failure",
            ErrorKind::KeyNotFound => "key_not_found",
            ErrorKind::KeyExpired => "key_expired",
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::InvalidMasterPassword => "invalid_master_password",
            ErrorKind::Expired => "expired",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidKey => "invalid_key",
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::CorruptedFile => "corrupted_file",
            ErrorKind::UnsupportedEnvironment => "unsupported_environment",
            ErrorKind::Io => "io",
            ErrorKind::Json => "json",
            ErrorKind::Storage => "storage",
            ErrorKind::Config => "config",
            ErrorKind::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// The main error type for ledger-vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Empty or malformed arguments, rejected before any crypto work
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Wrong password or tampered ciphertext; deliberately carries no detail
    #[error("Authentication failed: wrong password or tampered data")]
    AuthenticationFailure,

    /// Checksum or tag mismatch after the password was accepted
    #[error("Integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Key expired: {0}")]
    KeyExpired(String),

    /// Key manager used without a live session
    #[error("Key manager is not initialized")]
    NotInitialized,

    #[error("Invalid master password")]
    InvalidMasterPassword,

    /// Secure storage item past its expiration time
    #[error("Item expired: {0}")]
    Expired(String),

    /// Secure storage item missing
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Storage key does not match the allowed pattern
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Password below the enforced minimum strength
    #[error("Password policy violation: {0}")]
    PolicyViolation(String),

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// A required primitive (e.g. the OS random source) is unavailable
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A background crypto task could not be joined
    #[error("Worker error: {0}")]
    Worker(String),
}

impl VaultError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            Self::IntegrityFailure(_) => ErrorKind::IntegrityFailure,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::KeyExpired(_) => ErrorKind::KeyExpired,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::InvalidMasterPassword => ErrorKind::InvalidMasterPassword,
            Self::Expired(_) => ErrorKind::Expired,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::CorruptedFile(_) => ErrorKind::CorruptedFile,
            Self::UnsupportedEnvironment(_) => ErrorKind::UnsupportedEnvironment,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
            Self::Worker(_) => ErrorKind::Worker,
        }
    }

    /// Create an "invalid input" error for an empty argument
    pub fn empty(argument: &str) -> Self {
        Self::InvalidInput(format!("{} cannot be empty", argument))
    }

    /// Check if this is a "not found" error (storage item or key)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::KeyNotFound(_))
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for ledger-vault operations
pub type VaultResult<T> = Result<T, VaultError>;
