//! Persisted secure-storage records

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptionResult;
use crate::error::{VaultError, VaultResult};

/// Current storage export format version
pub const STORAGE_EXPORT_VERSION: u32 = 1;

/// Longest accepted storage key
pub const MAX_KEY_LENGTH: usize = 100;

/// Options for `SecureStorage::store`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// LZ4-compress the serialized payload before encryption
    pub compression: bool,
    /// Instant after which the item is treated as gone
    pub expires_at: Option<DateTime<Utc>>,
    /// Key-manager key this item is associated with
    pub key_id: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            compression: true,
            expires_at: None,
            key_id: None,
        }
    }
}

impl StoreOptions {
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Expire `ttl` from now
    ///
    /// Fails with `InvalidInput` if the instant is past the representable
    /// date range.
    pub fn ttl(mut self, ttl: Duration) -> VaultResult<Self> {
        let at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| VaultError::InvalidInput(format!("TTL {} is out of range", ttl)))?;
        self.expires_at = Some(at);
        Ok(self)
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }
}

/// Metadata kept in the clear next to the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    /// Length of the serialized plaintext
    pub original_size: usize,
    /// Length of the ciphertext
    pub encrypted_size: usize,
    /// SHA-256 hex of the serialized plaintext
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

/// One stored payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureStorageItem {
    pub id: String,
    pub encrypted_data: EncryptionResult,
    pub metadata: ItemMetadata,
}

impl SecureStorageItem {
    /// Expired iff `expires_at` is strictly before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.metadata.expires_at.map_or(false, |exp| exp < now)
    }
}

/// Versioned bulk export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub items: BTreeMap<String, SecureStorageItem>,
}

/// Summary of `SecureStorage::stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub item_count: usize,
    pub total_original_size: usize,
    pub total_encrypted_size: usize,
    pub compressed_count: usize,
    pub expired_count: usize,
}

/// Whether `key` is usable as a storage key: 1-100 of `[A-Za-z0-9_-]`
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
