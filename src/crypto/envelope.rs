//! The universal ciphertext envelope
//!
//! Every encrypted value in ledger-vault is an `EncryptionResult`: the
//! ciphertext plus the fresh IV and salt it was produced with, the detached
//! GCM tag, the KDF parameters, and a short key check. Byte fields are
//! standard base64.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

use super::encryption::{IV_SIZE, TAG_SIZE};
use super::key_derivation::{KdfParams, SALT_SIZE};

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

/// Algorithm label for envelopes
pub const ENVELOPE_ALGORITHM: &str = "AES-256-GCM";

/// Encrypted value with everything needed to decrypt it given the password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionResult {
    /// Version for future algorithm upgrades
    #[serde(default = "default_version")]
    pub version: u8,
    pub ciphertext: String,
    pub iv: String,
    pub salt: String,
    pub tag: String,
    /// Argon2id parameters used to derive the key from the password
    #[serde(default)]
    pub kdf: KdfParams,
    /// Verifier for the derived key; lets callers tell a wrong password apart
    /// from corrupted ciphertext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_check: Option<String>,
}

fn default_version() -> u8 {
    ENVELOPE_VERSION
}

/// Decoded raw bytes of an envelope
pub(crate) struct RawEnvelope {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub salt: Vec<u8>,
    pub tag: Vec<u8>,
}

impl EncryptionResult {
    pub(crate) fn from_parts(
        ciphertext: &[u8],
        iv: &[u8],
        salt: &[u8],
        tag: &[u8],
        kdf: KdfParams,
        key_check: String,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
            salt: STANDARD.encode(salt),
            tag: STANDARD.encode(tag),
            kdf,
            key_check: Some(key_check),
        }
    }

    /// Decode and size-check every field
    ///
    /// A malformed envelope is an input error. A tag of the wrong length is
    /// treated like any other tag mismatch.
    pub(crate) fn decode(&self) -> VaultResult<RawEnvelope> {
        if self.version != ENVELOPE_VERSION {
            return Err(VaultError::InvalidInput(format!(
                "Unsupported envelope version: {}",
                self.version
            )));
        }

        let iv = decode_field("iv", &self.iv)?;
        if iv.len() != IV_SIZE {
            return Err(VaultError::InvalidInput(format!(
                "Invalid IV size: expected {}, got {}",
                IV_SIZE,
                iv.len()
            )));
        }

        let salt = decode_field("salt", &self.salt)?;
        if salt.len() != SALT_SIZE {
            return Err(VaultError::InvalidInput(format!(
                "Invalid salt size: expected {}, got {}",
                SALT_SIZE,
                salt.len()
            )));
        }

        let tag = decode_field("tag", &self.tag)?;
        if tag.len() != TAG_SIZE {
            return Err(VaultError::AuthenticationFailure);
        }

        Ok(RawEnvelope {
            ciphertext: decode_field("ciphertext", &self.ciphertext)?,
            iv,
            salt,
            tag,
        })
    }

    /// Size of the decoded ciphertext in bytes
    pub fn ciphertext_len(&self) -> usize {
        STANDARD
            .decode(&self.ciphertext)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

fn decode_field(name: &str, value: &str) -> VaultResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| VaultError::InvalidInput(format!("Invalid {} encoding: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncryptionResult {
        EncryptionResult::from_parts(
            b"cipher",
            &[1u8; IV_SIZE],
            &[2u8; SALT_SIZE],
            &[3u8; TAG_SIZE],
            KdfParams::default(),
            "abcd".into(),
        )
    }

    #[test]
    fn test_decode() {
        let raw = sample().decode().unwrap();
        assert_eq!(raw.ciphertext, b"cipher");
        assert_eq!(raw.iv, vec![1u8; IV_SIZE]);
        assert_eq!(raw.salt, vec![2u8; SALT_SIZE]);
        assert_eq!(raw.tag, vec![3u8; TAG_SIZE]);
        assert_eq!(sample().ciphertext_len(), 6);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("ciphertext").is_some());
        assert!(json.get("keyCheck").is_some());
        assert_eq!(json["version"], 1);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{"ciphertext":"","iv":"","salt":"","tag":""}"#;
        let parsed: EncryptionResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.version, ENVELOPE_VERSION);
        assert_eq!(parsed.kdf, KdfParams::default());
        assert!(parsed.key_check.is_none());
    }

    #[test]
    fn test_bad_fields_rejected() {
        let mut bad_iv = sample();
        bad_iv.iv = STANDARD.encode([0u8; 4]);
        assert!(matches!(bad_iv.decode(), Err(VaultError::InvalidInput(_))));

        let mut bad_b64 = sample();
        bad_b64.salt = "***".into();
        assert!(matches!(bad_b64.decode(), Err(VaultError::InvalidInput(_))));

        let mut short_tag = sample();
        short_tag.tag = STANDARD.encode([0u8; 4]);
        assert!(matches!(
            short_tag.decode(),
            Err(VaultError::AuthenticationFailure)
        ));

        let mut future = sample();
        future.version = 9;
        assert!(matches!(future.decode(), Err(VaultError::InvalidInput(_))));
    }
}
