//! Cryptographic functions for ledger-vault
//!
//! Argon2id key derivation, AES-256-GCM envelopes, ECDSA signatures
//! and SHA-2 hashing, composed by [`CryptoEngine`] behind the
//! [`CryptoPrimitives`] adapter.

pub mod encryption;
pub mod engine;
pub mod envelope;
pub mod hash;
pub mod key_derivation;
pub mod password;
pub mod primitives;
pub mod secure_memory;
pub mod signing;
pub mod worker;

pub use engine::{CryptoEngine, DEFAULT_KEY_SIZE};
pub use envelope::{EncryptionResult, ENVELOPE_ALGORITHM, ENVELOPE_VERSION};
pub use hash::HashAlgorithm;
pub use key_derivation::{KdfParams, SALT_SIZE};
pub use password::{PasswordStrength, StrengthLevel};
pub use primitives::{CryptoPrimitives, NativePrimitives};
pub use secure_memory::{SecureBytes, SecureString};
pub use signing::{Curve, KeyPair, SIGNATURE_ALGORITHM};
