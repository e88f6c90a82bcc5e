//! Password Hashing
//! Mission: One-way salted hashing and timing-safe verification of secrets

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::debug;

/// bcrypt-backed secret hasher
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    // Verified against when an account does not exist, so the "no such
    // account" path costs the same as a wrong password.
    decoy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self> {
        let decoy_hash = hash("decoy-secret-never-matches", cost)
            .context("Failed to initialise password hasher")?;
        Ok(Self { cost, decoy_hash })
    }

    pub fn with_default_cost() -> Result<Self> {
        Self::new(DEFAULT_COST)
    }

    /// Hash a plaintext secret with a fresh salt
    pub fn hash(&self, plaintext: &str) -> Result<String> {
        hash(plaintext, self.cost).context("Failed to hash password")
    }

    /// Compare a plaintext secret against a stored digest.
    ///
    /// An unparseable digest is a mismatch, not an error.
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        match verify(plaintext, digest) {
            Ok(valid) => valid,
            Err(e) => {
                debug!("Password digest rejected: {}", e);
                false
            }
        }
    }

    /// Burn the same work as a real verification. Always `false`.
    pub fn verify_decoy(&self, plaintext: &str) -> bool {
        let _ = self.verify(plaintext, &self.decoy_hash);
        false
    }
}
