//! Off-thread execution of expensive crypto operations
//!
//! Argon2 derivation and key-pair generation can take hundreds of
//! milliseconds. These helpers move them onto tokio's blocking pool so an
//! async caller is never stalled. A started task always runs to completion;
//! dropping the returned future does not abort the derivation.

use std::sync::Arc;

use tokio::task;

use crate::error::{VaultError, VaultResult};

use super::engine::CryptoEngine;
use super::envelope::EncryptionResult;
use super::primitives::CryptoPrimitives;
use super::secure_memory::{SecureBytes, SecureString};
use super::signing::KeyPair;

async fn run_blocking<T, F>(job: F) -> VaultResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> VaultResult<T> + Send + 'static,
{
    task::spawn_blocking(job)
        .await
        .map_err(|e| VaultError::Worker(format!("Crypto task failed: {}", e)))?
}

pub async fn encrypt_text<P: CryptoPrimitives>(
    engine: Arc<CryptoEngine<P>>,
    plaintext: String,
    password: SecureString,
) -> VaultResult<EncryptionResult> {
    run_blocking(move || engine.encrypt_text(&plaintext, &password)).await
}

pub async fn decrypt_text<P: CryptoPrimitives>(
    engine: Arc<CryptoEngine<P>>,
    envelope: EncryptionResult,
    password: SecureString,
) -> VaultResult<SecureString> {
    run_blocking(move || engine.decrypt_text(&envelope, &password)).await
}

pub async fn generate_key_pair<P: CryptoPrimitives>(
    engine: Arc<CryptoEngine<P>>,
    key_size: u32,
) -> VaultResult<KeyPair> {
    run_blocking(move || engine.generate_key_pair(key_size)).await
}

pub async fn derive_key<P: CryptoPrimitives>(
    engine: Arc<CryptoEngine<P>>,
    password: SecureString,
    salt: Vec<u8>,
    length: usize,
) -> VaultResult<SecureBytes> {
    run_blocking(move || engine.derive_key(&password, &salt, length)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::engine::tests::test_engine;
    use crate::crypto::engine::DEFAULT_KEY_SIZE;

    #[tokio::test]
    async fn test_encrypt_decrypt_off_thread() {
        let engine = Arc::new(test_engine());
        let envelope = encrypt_text(engine.clone(), "payload".into(), "pw".into())
            .await
            .unwrap();
        let plain = decrypt_text(engine, envelope, "pw".into()).await.unwrap();
        assert_eq!(plain.as_str(), "payload");
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let engine = Arc::new(test_engine());
        let envelope = encrypt_text(engine.clone(), "payload".into(), "pw".into())
            .await
            .unwrap();
        let result = decrypt_text(engine, envelope, "nope".into()).await;
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[tokio::test]
    async fn test_key_pair_and_derivation() {
        let engine = Arc::new(test_engine());
        let pair = generate_key_pair(engine.clone(), DEFAULT_KEY_SIZE)
            .await
            .unwrap();
        assert!(pair.public_key.contains("PUBLIC KEY"));

        let key = derive_key(engine, "pw".into(), vec![1u8; 16], 32)
            .await
            .unwrap();
        assert_eq!(key.len(), 32);
    }
}
