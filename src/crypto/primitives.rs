//! Crypto primitives adapter
//!
//! The engine reaches every primitive through `CryptoPrimitives`. There is a
//! single production implementation, `NativePrimitives`; the trait exists so
//! the engine's composition can be exercised against a substitute (for
//! example a random source that is unavailable).

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{VaultError, VaultResult};

use super::encryption::{self, Sealed};
use super::hash::{self, HashAlgorithm};
use super::key_derivation::{self, KdfParams};
use super::secure_memory::SecureBytes;
use super::signing::{self, KeyPair};

/// Primitive operations the engine is composed from
///
/// Implementations hold no shared mutable state; every call is independent.
pub trait CryptoPrimitives: Send + Sync + 'static {
    /// Fill `buf` from a cryptographically secure source
    fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()>;

    /// Password-based key derivation producing `output_len` bytes
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
        output_len: usize,
    ) -> VaultResult<SecureBytes>;

    fn aead_seal(&self, key: &[u8], iv: &[u8], aad: &[u8], plaintext: &[u8])
        -> VaultResult<Sealed>;

    fn aead_open(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> VaultResult<SecureBytes>;

    /// Generate a signing key pair meeting `key_size` (RSA-equivalent bits)
    fn generate_key_pair(&self, key_size: u32) -> VaultResult<KeyPair>;

    fn sign(&self, private_key: &str, data: &[u8]) -> VaultResult<Vec<u8>>;

    fn verify(&self, public_key: &str, data: &[u8], signature: &[u8]) -> VaultResult<bool>;

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8>;
}

/// Argon2id, AES-256-GCM, ECDSA over P-256/P-384/P-521, SHA-2 and the OS random source
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePrimitives;

impl CryptoPrimitives for NativePrimitives {
    fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()> {
        OsRng.try_fill_bytes(buf).map_err(|e| {
            VaultError::UnsupportedEnvironment(format!("Secure random source unavailable: {}", e))
        })
    }

    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
        output_len: usize,
    ) -> VaultResult<SecureBytes> {
        key_derivation::derive_key_material(password, salt, params, output_len)
    }

    fn aead_seal(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<Sealed> {
        encryption::seal(key, iv, aad, plaintext)
    }

    fn aead_open(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> VaultResult<SecureBytes> {
        encryption::open(key, iv, aad, ciphertext, tag)
    }

    fn generate_key_pair(&self, key_size: u32) -> VaultResult<KeyPair> {
        let curve = signing::Curve::for_strength(key_size)?;
        // Key generation draws from OsRng internally and cannot report a
        // failure, so check the source first.
        self.fill_random(&mut [0u8; 1])?;
        signing::generate_key_pair(curve)
    }

    fn sign(&self, private_key: &str, data: &[u8]) -> VaultResult<Vec<u8>> {
        signing::sign(private_key, data)
    }

    fn verify(&self, public_key: &str, data: &[u8], signature: &[u8]) -> VaultResult<bool> {
        signing::verify(public_key, data, signature)
    }

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        hash::digest(algorithm, data)
    }
}
