//! Security log entry data structures
//!
//! Defines the events that can be recorded, the outcome status, and the
//! per-category detail payloads. Details only ever carry lengths, counts,
//! identifiers and algorithm names: never passwords, keys or plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, VaultError};

/// Outcome of a recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    Warning,
    Failure,
}

impl LogStatus {
    /// Status to record for a failed operation
    pub fn for_error(err: &VaultError) -> Self {
        if err.kind().is_security_failure() {
            LogStatus::Failure
        } else {
            LogStatus::Error
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStatus::Success => write!(f, "SUCCESS"),
            LogStatus::Error => write!(f, "ERROR"),
            LogStatus::Warning => write!(f, "WARNING"),
            LogStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Operations that produce security log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEvent {
    EncryptText,
    DecryptText,
    EncryptBytes,
    DecryptBytes,
    DeriveKey,
    GenerateKeyPair,
    GenerateRandomKey,
    CreateSignature,
    VerifySignature,
    Hash,
    PasswordStrength,
    GeneratePassword,
    KeyManagerInit,
    KeyManagerLock,
    KeyGenerate,
    KeyAccess,
    KeyList,
    KeyDelete,
    KeyRotate,
    MasterPasswordChange,
    KeyExport,
    KeyImport,
    StorageStore,
    StorageRetrieve,
    StorageRemove,
    StorageList,
    StorageStats,
    StorageCleanup,
    StoragePasswordUpdate,
    StorageExport,
    StorageImport,
    FileEncrypt,
    FileDecrypt,
}

impl std::fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Reuse the serde name so the log file and the display agree
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Category-specific detail payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum EventDetails {
    /// Key or key-pair generation
    Generation {
        algorithm: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        key_size: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        key_id: Option<String>,
    },
    /// Password-based key derivation
    Derivation {
        algorithm: String,
        memory_cost: u32,
        time_cost: u32,
    },
    /// Symmetric encryption or decryption
    Encryption {
        algorithm: String,
        input_len: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_len: Option<usize>,
    },
    /// Signing, verification and hashing
    Signature {
        algorithm: String,
        data_len: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        valid: Option<bool>,
    },
    /// Secure storage and file operations
    Storage {
        #[serde(skip_serializing_if = "Option::is_none")]
        storage_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        compressed: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
    /// Key lifecycle and session bookkeeping
    Audit {
        #[serde(skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    /// A failed operation
    Failure { kind: ErrorKind, context: String },
}

impl EventDetails {
    pub fn encryption(algorithm: &str, input_len: usize, output_len: Option<usize>) -> Self {
        Self::Encryption {
            algorithm: algorithm.to_string(),
            input_len,
            output_len,
        }
    }

    pub fn storage(storage_key: impl Into<String>) -> Self {
        Self::Storage {
            storage_key: Some(storage_key.into()),
            size: None,
            compressed: None,
            count: None,
        }
    }

    pub fn storage_count(count: usize) -> Self {
        Self::Storage {
            storage_key: None,
            size: None,
            compressed: None,
            count: Some(count),
        }
    }

    pub fn audit(subject: Option<String>) -> Self {
        Self::Audit {
            subject,
            count: None,
            note: None,
        }
    }

    pub fn audit_count(count: usize) -> Self {
        Self::Audit {
            subject: None,
            count: Some(count),
            note: None,
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        Self::Audit {
            subject: None,
            count: None,
            note: Some(note.into()),
        }
    }

    /// Failure details from an error, with the caller's context
    pub fn failure(err: &VaultError, context: impl Into<String>) -> Self {
        Self::Failure {
            kind: err.kind(),
            context: context.into(),
        }
    }
}

/// A single security log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: SecurityEvent,
    pub status: LogStatus,
    pub details: EventDetails,
    pub session_id: Uuid,
}

impl SecurityLogEntry {
    pub fn new(
        session_id: Uuid,
        event: SecurityEvent,
        status: LogStatus,
        details: EventDetails,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            status,
            details,
            session_id,
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.status,
            self.event
        );

        match &self.details {
            EventDetails::Failure { kind, context } => {
                output.push_str(&format!(" ({}: {})", kind, context));
            }
            EventDetails::Generation {
                key_id: Some(id), ..
            } => {
                output.push_str(&format!(" ({})", id));
            }
            EventDetails::Storage {
                storage_key: Some(key),
                ..
            } => {
                output.push_str(&format!(" ({})", key));
            }
            EventDetails::Audit {
                subject: Some(subject),
                ..
            } => {
                output.push_str(&format!(" ({})", subject));
            }
            _ => {}
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(LogStatus::Success.to_string(), "SUCCESS");
        assert_eq!(LogStatus::Failure.to_string(), "FAILURE");
    }

    #[test]
    fn test_event_display_matches_serde() {
        assert_eq!(SecurityEvent::EncryptText.to_string(), "encrypt_text");
        assert_eq!(SecurityEvent::MasterPasswordChange.to_string(), "master_password_change");
    }

    #[test]
    fn test_status_for_error() {
        assert_eq!(
            LogStatus::for_error(&VaultError::AuthenticationFailure),
            LogStatus::Failure
        );
        assert_eq!(
            LogStatus::for_error(&VaultError::InvalidInput("x".into())),
            LogStatus::Error
        );
    }

    #[test]
    fn test_details_are_tagged() {
        let details = EventDetails::encryption("AES-256-GCM", 12, Some(12));
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["category"], "encryption");
        assert_eq!(json["input_len"], 12);

        let failure = EventDetails::failure(&VaultError::NotInitialized, "get_key");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["category"], "failure");
        assert_eq!(json["kind"], "not_initialized");
    }

    #[test]
    fn test_serialization_round_trip() {
        let entry = SecurityLogEntry::new(
            Uuid::new_v4(),
            SecurityEvent::StorageStore,
            LogStatus::Success,
            EventDetails::storage("backup_2024"),
        );
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: SecurityLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_human_readable_format() {
        let entry = SecurityLogEntry::new(
            Uuid::new_v4(),
            SecurityEvent::KeyAccess,
            LogStatus::Error,
            EventDetails::failure(&VaultError::KeyExpired("key_1".into()), "key_1"),
        );
        let formatted = entry.format_human_readable();
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("key_access"));
        assert!(formatted.contains("key_expired"));
    }
}
