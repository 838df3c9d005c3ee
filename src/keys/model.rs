//! Stored key model
//!
//! A `StoredKey` is the persisted form of a named key: metadata in the clear,
//! key material only as an envelope under the master password.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::EncryptionResult;

/// Opaque key identifier: `key_<unix millis>_<12 hex chars>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Build an id from its creation instant and random suffix bytes
    pub fn from_parts(created_at: DateTime<Utc>, random: &[u8]) -> Self {
        Self(format!(
            "key_{}_{}",
            created_at.timestamp_millis(),
            hex::encode(random)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of key held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Random bytes used as a symmetric key
    Symmetric,
    /// Signing key pair; the private half is the protected material
    Asymmetric,
}

impl KeyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "symmetric" | "sym" => Some(Self::Symmetric),
            "asymmetric" | "asym" | "keypair" => Some(Self::Asymmetric),
            _ => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symmetric => write!(f, "symmetric"),
            Self::Asymmetric => write!(f, "asymmetric"),
        }
    }
}

/// Descriptive metadata carried through rotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub purpose: String,
    pub owner: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl KeyMetadata {
    pub fn new(purpose: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            owner: owner.into(),
            permissions: Vec::new(),
        }
    }
}

/// A named key as persisted in the key index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKey {
    pub id: KeyId,

    pub name: String,

    #[serde(rename = "type")]
    pub key_type: KeyType,

    pub algorithm: String,

    /// Key material encrypted under the master password
    pub key_data: EncryptionResult,

    /// Public half of an asymmetric key, stored in the clear
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Symmetric key length in bits, or requested asymmetric strength
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    pub metadata: KeyMetadata,
}

impl StoredKey {
    /// Expired iff `expires_at` is strictly before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp < now)
    }

    /// Time left before expiry; `None` for keys that never expire
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|exp| exp - now)
    }
}

/// Key description without key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub id: KeyId,
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: KeyMetadata,
}

impl KeyInfo {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |exp| exp < now)
    }
}

impl From<&StoredKey> for KeyInfo {
    fn from(key: &StoredKey) -> Self {
        Self {
            id: key.id.clone(),
            name: key.name.clone(),
            key_type: key.key_type,
            algorithm: key.algorithm.clone(),
            public_key: key.public_key.clone(),
            key_size: key.key_size,
            created_at: key.created_at,
            expires_at: key.expires_at,
            metadata: key.metadata.clone(),
        }
    }
}
