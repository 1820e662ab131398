//! Token secret generation and digesting.
//!
//! Secrets are 32 bytes (256 bits) from the operating system's CSPRNG,
//! hex-encoded. Only the SHA-256 hex digest of a secret is ever stored;
//! lookup recomputes the digest from the presented secret. Plaintext
//! secrets are returned to the caller exactly once and never logged.

use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes backing a secret.
pub const SECRET_BYTES: usize = 32;

/// Length of a hex-encoded secret.
pub const SECRET_LEN: usize = SECRET_BYTES * 2;

/// Shortest string the validator will bother digesting. Anything
/// shorter is rejected before any hashing or store lookup.
pub const MIN_SECRET_LEN: usize = SECRET_LEN;

/// Generate a new token secret: 64 hex characters of fresh entropy.
///
/// Failure to obtain entropy from the OS is unrecoverable and panics.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS entropy source failed");
    hex::encode(bytes)
}

/// Compute the SHA-256 hex digest of a secret. Pure and deterministic;
/// this is the only form a secret is persisted in.
pub fn digest_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
