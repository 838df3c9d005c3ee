//! AES-256-GCM encryption/decryption
//!
//! Raw authenticated encryption over byte slices. The tag is returned
//! detached so the envelope can carry it as its own field.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};

use crate::error::{VaultError, VaultResult};

use super::secure_memory::SecureBytes;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const IV_SIZE: usize = 12;

/// Size of the AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Ciphertext and detached authentication tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

fn cipher(key: &[u8]) -> VaultResult<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        return Err(VaultError::InvalidInput(format!(
            "Invalid key size: expected {}, got {}",
            KEY_SIZE,
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::InvalidInput(format!("Failed to create cipher: {}", e)))
}

fn check_iv(iv: &[u8]) -> VaultResult<()> {
    if iv.len() != IV_SIZE {
        return Err(VaultError::InvalidInput(format!(
            "Invalid IV size: expected {}, got {}",
            IV_SIZE,
            iv.len()
        )));
    }
    Ok(())
}

/// Encrypt `plaintext` under `key` and `iv`, authenticating `aad` as well
pub fn seal(key: &[u8], iv: &[u8], aad: &[u8], plaintext: &[u8]) -> VaultResult<Sealed> {
    let cipher = cipher(key)?;
    check_iv(iv)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), aad, buffer.as_mut_slice())
        .map_err(|_| VaultError::InvalidInput("Encryption failed: message too long".into()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Sealed {
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and verify
///
/// Any tag mismatch (wrong key, wrong associated data, modified ciphertext
/// or tag) yields `AuthenticationFailure` and no plaintext.
pub fn open(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> VaultResult<SecureBytes> {
    let cipher = cipher(key)?;
    check_iv(iv)?;
    if tag.len() != TAG_SIZE {
        return Err(VaultError::AuthenticationFailure);
    }

    let mut buffer = SecureBytes::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(iv),
            aad,
            buffer.as_bytes_mut(),
            Tag::from_slice(tag),
        )
        .map_err(|_| VaultError::AuthenticationFailure)?;

    Ok(buffer)
}
