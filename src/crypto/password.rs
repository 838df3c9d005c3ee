//! Password strength classification and generation
//!
//! The strength report is advisory; the master-password policy is the only
//! place a minimum is enforced.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

use super::secure_memory::SecureString;

/// Minimum length for the advisory check
pub const ADVISORY_MIN_LENGTH: usize = 8;

/// Minimum length for a master password
pub const MASTER_MIN_LENGTH: usize = 12;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{};:,.?";

/// Coarse strength rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthLevel {
    Weak,
    Fair,
    Strong,
}

/// Which character classes and length thresholds a password meets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStrength {
    pub length: usize,
    pub has_lower: bool,
    pub has_upper: bool,
    pub has_digit: bool,
    pub has_symbol: bool,
    /// 0..=5: one point for sufficient length, one per character class
    pub score: u8,
    pub level: StrengthLevel,
}

impl PasswordStrength {
    /// Classify a password
    pub fn evaluate(password: &str) -> Self {
        let length = password.chars().count();
        let has_lower = password.chars().any(|c| c.is_lowercase());
        let has_upper = password.chars().any(|c| c.is_uppercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_symbol = password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

        let score = [
            length >= ADVISORY_MIN_LENGTH,
            has_lower,
            has_upper,
            has_digit,
            has_symbol,
        ]
        .iter()
        .filter(|met| **met)
        .count() as u8;

        let level = match score {
            5 => StrengthLevel::Strong,
            3 | 4 => StrengthLevel::Fair,
            _ => StrengthLevel::Weak,
        };

        Self {
            length,
            has_lower,
            has_upper,
            has_digit,
            has_symbol,
            score,
            level,
        }
    }

    /// Meets the advisory threshold: long enough and all four classes
    pub fn is_acceptable(&self) -> bool {
        self.score == 5
    }

    /// Names of the unmet requirements, for user feedback
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.length < ADVISORY_MIN_LENGTH {
            missing.push("length");
        }
        if !self.has_lower {
            missing.push("lowercase");
        }
        if !self.has_upper {
            missing.push("uppercase");
        }
        if !self.has_digit {
            missing.push("digit");
        }
        if !self.has_symbol {
            missing.push("symbol");
        }
        missing
    }
}

/// Enforce the master-password policy: at least 12 characters, all four classes
pub fn validate_master_password(password: &str) -> VaultResult<()> {
    let strength = PasswordStrength::evaluate(password);
    if strength.length < MASTER_MIN_LENGTH {
        return Err(VaultError::PolicyViolation(format!(
            "Master password must be at least {} characters",
            MASTER_MIN_LENGTH
        )));
    }
    if !(strength.has_lower && strength.has_upper && strength.has_digit && strength.has_symbol) {
        return Err(VaultError::PolicyViolation(format!(
            "Master password is missing: {}",
            strength.missing().join(", ")
        )));
    }
    Ok(())
}

/// Generate a random password containing every character class
pub fn generate_password(length: usize) -> VaultResult<SecureString> {
    if length < 4 {
        return Err(VaultError::InvalidInput(
            "Generated passwords need at least 4 characters".into(),
        ));
    }

    let classes = [LOWER, UPPER, DIGITS, SYMBOLS];
    let all: Vec<u8> = classes.concat();
    let mut rng = OsRng;

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < length {
        chars.push(all[rng.gen_range(0..all.len())]);
    }

    // Fisher-Yates so the guaranteed characters are not always first
    for i in (1..chars.len()).rev() {
        let j = rng.gen_range(0..=i);
        chars.swap(i, j);
    }

    let password = String::from_utf8(chars)
        .map_err(|_| VaultError::InvalidInput("Generated password is not UTF-8".into()))?;
    Ok(SecureString::new(password))
}
