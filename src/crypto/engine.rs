//! Crypto engine
//!
//! Composes the primitives into password-based text/byte encryption,
//! signatures, hashing and password utilities. Every public operation writes
//! one entry to the security log; failures are logged with their error kind
//! and never with passwords, keys or plaintext.
//!
//! The key manager and secure storage use the crate-internal `seal`/`open`
//! pair instead, so that each of their operations is logged once at their
//! own level.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::audit::{EventDetails, SecurityEvent, SecurityLog};
use crate::error::{VaultError, VaultResult};

use super::encryption::{IV_SIZE, KEY_SIZE};
use super::envelope::{EncryptionResult, ENVELOPE_ALGORITHM};
use super::hash::HashAlgorithm;
use super::key_derivation::{KdfParams, SALT_SIZE};
use super::password::{self, PasswordStrength};
use super::primitives::{CryptoPrimitives, NativePrimitives};
use super::secure_memory::{SecureBytes, SecureString};
use super::signing::{Curve, KeyPair, SIGNATURE_ALGORITHM};

/// Default requested strength for asymmetric keys (RSA-equivalent bits)
pub const DEFAULT_KEY_SIZE: u32 = 2048;

/// Hex characters of the key check stored in envelopes
const KEY_CHECK_LEN: usize = 16;

const KDF_ALGORITHM: &str = "Argon2id";

/// Cryptographic engine over a primitives adapter
pub struct CryptoEngine<P: CryptoPrimitives = NativePrimitives> {
    primitives: P,
    kdf: KdfParams,
    log: Arc<SecurityLog>,
}

impl CryptoEngine<NativePrimitives> {
    /// Engine with default Argon2id parameters
    pub fn new(log: Arc<SecurityLog>) -> Self {
        Self::with_kdf(KdfParams::default(), log)
    }

    pub fn with_kdf(kdf: KdfParams, log: Arc<SecurityLog>) -> Self {
        Self::with_primitives(NativePrimitives, kdf, log)
    }
}

impl<P: CryptoPrimitives> CryptoEngine<P> {
    pub fn with_primitives(primitives: P, kdf: KdfParams, log: Arc<SecurityLog>) -> Self {
        Self {
            primitives,
            kdf,
            log,
        }
    }

    pub fn log(&self) -> &Arc<SecurityLog> {
        &self.log
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.kdf
    }

    // ----- text and byte encryption -------------------------------------

    /// Encrypt text under a password with a fresh salt and IV
    pub fn encrypt_text(&self, plaintext: &str, password: &str) -> VaultResult<EncryptionResult> {
        let result = self
            .require_non_empty(plaintext.as_bytes(), "plaintext")
            .and_then(|_| self.require_non_empty(password.as_bytes(), "password"))
            .and_then(|_| {
                self.check_password_strength(password);
                self.seal(password, &[], plaintext.as_bytes())
            });

        self.log
            .outcome(SecurityEvent::EncryptText, "encrypt_text", result, |r| {
                EventDetails::encryption(ENVELOPE_ALGORITHM, plaintext.len(), Some(r.ciphertext_len()))
            })
    }

    /// Decrypt text produced by `encrypt_text`
    ///
    /// A wrong password and a tampered envelope both fail with
    /// `AuthenticationFailure`.
    pub fn decrypt_text(
        &self,
        result: &EncryptionResult,
        password: &str,
    ) -> VaultResult<SecureString> {
        let outcome = self
            .require_non_empty(password.as_bytes(), "password")
            .and_then(|_| self.open(result, password, &[]).map_err(collapse_auth))
            .and_then(|bytes| {
                SecureString::from_utf8(bytes)
                    .ok_or_else(|| VaultError::InvalidInput("Decrypted data is not UTF-8".into()))
            });

        self.log
            .outcome(SecurityEvent::DecryptText, "decrypt_text", outcome, |s| {
                EventDetails::encryption(ENVELOPE_ALGORITHM, result.ciphertext_len(), Some(s.len()))
            })
    }

    /// Encrypt raw bytes under a password
    pub fn encrypt_bytes(&self, data: &[u8], password: &str) -> VaultResult<EncryptionResult> {
        let result = self
            .require_non_empty(data, "data")
            .and_then(|_| self.require_non_empty(password.as_bytes(), "password"))
            .and_then(|_| self.seal(password, &[], data));

        self.log
            .outcome(SecurityEvent::EncryptBytes, "encrypt_bytes", result, |r| {
                EventDetails::encryption(ENVELOPE_ALGORITHM, data.len(), Some(r.ciphertext_len()))
            })
    }

    /// Decrypt bytes produced by `encrypt_bytes`
    pub fn decrypt_bytes(
        &self,
        result: &EncryptionResult,
        password: &str,
    ) -> VaultResult<SecureBytes> {
        let outcome = self
            .require_non_empty(password.as_bytes(), "password")
            .and_then(|_| self.open(result, password, &[]).map_err(collapse_auth));

        self.log
            .outcome(SecurityEvent::DecryptBytes, "decrypt_bytes", outcome, |b| {
                EventDetails::encryption(ENVELOPE_ALGORITHM, result.ciphertext_len(), Some(b.len()))
            })
    }

    /// Derive `length` bytes from a password and salt with the engine's
    /// Argon2id parameters
    pub fn derive_key(
        &self,
        password: &str,
        salt: &[u8],
        length: usize,
    ) -> VaultResult<SecureBytes> {
        let result = self
            .require_non_empty(password.as_bytes(), "password")
            .and_then(|_| {
                if length == 0 {
                    return Err(VaultError::empty("key length"));
                }
                self.primitives
                    .derive_key(password.as_bytes(), salt, &self.kdf, length)
            });

        let kdf = self.kdf;
        self.log
            .outcome(SecurityEvent::DeriveKey, "derive_key", result, |_| {
                EventDetails::Derivation {
                    algorithm: KDF_ALGORITHM.to_string(),
                    memory_cost: kdf.memory_cost,
                    time_cost: kdf.time_cost,
                }
            })
    }

    // ----- asymmetric -----------------------------------------------------

    /// Generate a signing key pair of at least `key_size` RSA-equivalent bits
    pub fn generate_key_pair(&self, key_size: u32) -> VaultResult<KeyPair> {
        let result = self.primitives.generate_key_pair(key_size);
        self.log
            .outcome(SecurityEvent::GenerateKeyPair, "generate_key_pair", result, |pair| {
                EventDetails::Generation {
                    algorithm: pair.curve.algorithm().to_string(),
                    key_size: Some(key_size),
                    key_id: None,
                }
            })
    }

    /// Sign `data`, returning a base64 signature
    pub fn create_digital_signature(&self, data: &[u8], private_key: &str) -> VaultResult<String> {
        let result = self
            .require_non_empty(private_key.as_bytes(), "private key")
            .and_then(|_| self.primitives.sign(private_key, data));
        let algorithm = signature_algorithm(result.as_deref().ok());

        self.log
            .outcome(
                SecurityEvent::CreateSignature,
                "create_signature",
                result.map(|sig| STANDARD.encode(sig)),
                |_| EventDetails::Signature {
                    algorithm,
                    data_len: data.len(),
                    valid: None,
                },
            )
    }

    /// Verify a base64 signature
    ///
    /// Never fails: anything that does not verify (mismatch, malformed
    /// signature or key) returns `false` and logs a `failure`.
    pub fn verify_digital_signature(&self, data: &[u8], signature: &str, public_key: &str) -> bool {
        let decoded = STANDARD
            .decode(signature)
            .map_err(|_| VaultError::InvalidInput("Malformed signature encoding".into()));
        let algorithm = signature_algorithm(decoded.as_deref().ok());
        let outcome = decoded.and_then(|sig| self.primitives.verify(public_key, data, &sig));

        let valid = matches!(outcome, Ok(true));
        let details = EventDetails::Signature {
            algorithm,
            data_len: data.len(),
            valid: Some(valid),
        };
        if valid {
            self.log.success(SecurityEvent::VerifySignature, details);
        } else {
            self.log.record(
                SecurityEvent::VerifySignature,
                crate::audit::LogStatus::Failure,
                details,
            );
        }
        valid
    }

    // ----- hashing and utilities -----------------------------------------

    /// Hex digest of `data`
    pub fn generate_secure_hash(&self, data: &[u8], algorithm: HashAlgorithm) -> String {
        let digest = self.primitives.hash(algorithm, data);
        self.log.success(
            SecurityEvent::Hash,
            EventDetails::encryption(&algorithm.to_string(), data.len(), Some(digest.len())),
        );
        hex::encode(digest)
    }

    /// Advisory strength classification; logs a warning for weak passwords
    /// and never blocks anything
    pub fn check_password_strength(&self, password: &str) -> PasswordStrength {
        let strength = PasswordStrength::evaluate(password);
        if !strength.is_acceptable() {
            self.log.warning(
                SecurityEvent::PasswordStrength,
                EventDetails::note(format!(
                    "weak password (score {}/5, missing: {})",
                    strength.score,
                    strength.missing().join(", ")
                )),
            );
        }
        strength
    }

    /// Random symmetric key of `length` bytes, hex encoded
    pub fn generate_random_key(&self, length: usize) -> VaultResult<SecureString> {
        let result = self.random_key_hex(length);
        self.log
            .outcome(SecurityEvent::GenerateRandomKey, "generate_random_key", result, |_| {
                EventDetails::Generation {
                    algorithm: "random".to_string(),
                    key_size: Some((length * 8) as u32),
                    key_id: None,
                }
            })
    }

    /// Random password containing every character class
    pub fn generate_secure_password(&self, length: usize) -> VaultResult<SecureString> {
        let result = self
            .check_random()
            .and_then(|_| password::generate_password(length));
        self.log.outcome(
            SecurityEvent::GeneratePassword,
            "generate_secure_password",
            result,
            |_| EventDetails::Generation {
                algorithm: "password".to_string(),
                key_size: None,
                key_id: None,
            },
        )
    }

    // ----- crate-internal composition ---------------------------------------

    pub(crate) fn random_bytes(&self, length: usize) -> VaultResult<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.primitives.fill_random(&mut bytes)?;
        Ok(bytes)
    }

    pub(crate) fn random_key_hex(&self, length: usize) -> VaultResult<SecureString> {
        if length == 0 {
            return Err(VaultError::empty("key length"));
        }
        let mut key = SecureBytes::zeroed(length);
        self.primitives.fill_random(key.as_bytes_mut())?;
        Ok(key.to_hex())
    }

    pub(crate) fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        self.primitives.hash(algorithm, data)
    }

    pub(crate) fn generate_key_pair_unlogged(&self, key_size: u32) -> VaultResult<KeyPair> {
        self.primitives.generate_key_pair(key_size)
    }

    /// Encrypt under a password-derived key, binding `aad`
    pub(crate) fn seal(
        &self,
        password: &str,
        aad: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<EncryptionResult> {
        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; IV_SIZE];
        self.primitives.fill_random(&mut salt)?;
        self.primitives.fill_random(&mut iv)?;

        let material =
            self.primitives
                .derive_key(password.as_bytes(), &salt, &self.kdf, KEY_SIZE * 2)?;
        let (key, check) = material.as_bytes().split_at(KEY_SIZE);

        let sealed = self.primitives.aead_seal(key, &iv, aad, plaintext)?;

        Ok(EncryptionResult::from_parts(
            &sealed.ciphertext,
            &iv,
            &salt,
            &sealed.tag,
            self.kdf,
            self.key_check(check),
        ))
    }

    /// Decrypt an envelope
    ///
    /// A key-check mismatch means the password is wrong
    /// (`AuthenticationFailure`). A matching key check followed by a tag
    /// failure means the envelope was altered (`IntegrityFailure`).
    /// Envelopes without a key check report every tag failure as
    /// `AuthenticationFailure`.
    pub(crate) fn open(
        &self,
        envelope: &EncryptionResult,
        password: &str,
        aad: &[u8],
    ) -> VaultResult<SecureBytes> {
        let raw = envelope.decode()?;
        envelope.kdf.check_bounds()?;

        let material = self.primitives.derive_key(
            password.as_bytes(),
            &raw.salt,
            &envelope.kdf,
            KEY_SIZE * 2,
        )?;
        let (key, check) = material.as_bytes().split_at(KEY_SIZE);

        let key_verified = match &envelope.key_check {
            Some(expected) => {
                if *expected != self.key_check(check) {
                    return Err(VaultError::AuthenticationFailure);
                }
                true
            }
            None => false,
        };

        self.primitives
            .aead_open(key, &raw.iv, aad, &raw.ciphertext, &raw.tag)
            .map_err(|e| match e {
                VaultError::AuthenticationFailure if key_verified => VaultError::IntegrityFailure(
                    "ciphertext failed authentication".into(),
                ),
                other => other,
            })
    }

    fn key_check(&self, check_material: &[u8]) -> String {
        let digest = hex::encode(self.primitives.hash(HashAlgorithm::Sha256, check_material));
        digest[..KEY_CHECK_LEN].to_string()
    }

    fn check_random(&self) -> VaultResult<()> {
        self.primitives.fill_random(&mut [0u8; 1])
    }

    fn require_non_empty(&self, value: &[u8], name: &str) -> VaultResult<()> {
        if value.is_empty() {
            return Err(VaultError::empty(name));
        }
        Ok(())
    }
}

/// Curve label for a raw signature, by its width
fn signature_algorithm(signature: Option<&[u8]>) -> String {
    signature
        .and_then(|sig| Curve::from_signature_len(sig.len()))
        .map_or(SIGNATURE_ALGORITHM, Curve::algorithm)
        .to_string()
}

/// The public decrypt path does not distinguish wrong password from tampering
pub(crate) fn collapse_auth(err: VaultError) -> VaultError {
    match err {
        VaultError::IntegrityFailure(_) => VaultError::AuthenticationFailure,
        other => other,
    }
}
