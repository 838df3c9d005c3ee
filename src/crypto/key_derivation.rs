//! Key derivation using Argon2id
//!
//! Derives key material from passwords using Argon2id, a memory-hard key
//! derivation function resistant to GPU/ASIC attacks. The salt is supplied
//! by the caller and is fresh for every envelope.

use argon2::{Argon2, Params};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

use super::secure_memory::SecureBytes;

/// Salt length in bytes
pub const SALT_SIZE: usize = 16;

/// Largest accepted memory cost in KiB (1 GiB)
pub const MAX_MEMORY_COST: u32 = 1024 * 1024;

/// Largest accepted number of passes
pub const MAX_TIME_COST: u32 = 10;

/// Largest accepted number of lanes
pub const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters
///
/// Recorded inside every envelope so that later changes to the configured
/// defaults never make existing data undecryptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Create params with specific values
    pub fn with_values(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    /// Reject costs above the accepted ceilings
    ///
    /// Parameters travel inside envelopes, so they are untrusted input.
    pub fn check_bounds(&self) -> VaultResult<()> {
        if self.memory_cost > MAX_MEMORY_COST {
            return Err(VaultError::InvalidInput(format!(
                "Argon2 memory cost {} KiB exceeds {} KiB",
                self.memory_cost, MAX_MEMORY_COST
            )));
        }
        if self.time_cost > MAX_TIME_COST {
            return Err(VaultError::InvalidInput(format!(
                "Argon2 time cost {} exceeds {}",
                self.time_cost, MAX_TIME_COST
            )));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(VaultError::InvalidInput(format!(
                "Argon2 parallelism {} exceeds {}",
                self.parallelism, MAX_PARALLELISM
            )));
        }
        Ok(())
    }

    fn to_argon2(self, output_len: usize) -> VaultResult<Argon2<'static>> {
        self.check_bounds()?;
        let params = Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            Some(output_len),
        )
        .map_err(|e| VaultError::InvalidInput(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }
}

/// Derive `output_len` bytes of key material from a password and salt
pub fn derive_key_material(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
    output_len: usize,
) -> VaultResult<SecureBytes> {
    if salt.len() < argon2::RECOMMENDED_SALT_LEN {
        return Err(VaultError::InvalidInput(format!(
            "Salt too short: expected at least {} bytes, got {}",
            argon2::RECOMMENDED_SALT_LEN,
            salt.len()
        )));
    }

    let argon2 = params.to_argon2(output_len)?;
    let mut output = SecureBytes::zeroed(output_len);

    argon2
        .hash_password_into(password, salt, output.as_bytes_mut())
        .map_err(|e| VaultError::InvalidInput(format!("Key derivation failed: {}", e)))?;

    Ok(output)
}
