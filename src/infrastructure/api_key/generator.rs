//! API Key generation
//!
//! Generates cryptographically secure API keys and their SHA-256 digests.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::domain::api_key::{DISPLAY_PREFIX_LENGTH, SECRET_BODY_LENGTH, SECRET_PREFIX};

/// Result of generating a new API key
pub struct GeneratedApiKey {
    /// The full secret (only shown once at creation)
    pub secret: String,
    /// Leading characters kept for display
    pub prefix: String,
    /// Hex SHA-256 of the full secret, the only persisted form
    pub hash: String,
}

impl std::fmt::Debug for GeneratedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedApiKey")
            .field("secret", &"[hidden]")
            .field("prefix", &self.prefix)
            .field("hash", &self.hash)
            .finish()
    }
}

/// Generator for secure API keys
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGenerator;

impl ApiKeyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a new key: fixed prefix + 64 lowercase hex chars (256 random bits)
    pub fn generate(&self) -> GeneratedApiKey {
        let mut random_bytes = [0u8; SECRET_BODY_LENGTH / 2];
        OsRng.fill_bytes(&mut random_bytes);

        let secret = format!("{}{}", SECRET_PREFIX, hex::encode(random_bytes));

        GeneratedApiKey {
            prefix: display_prefix(&secret).to_string(),
            hash: hash_secret(&secret),
            secret,
        }
    }

    /// Verify a presented secret against a stored digest in constant time
    pub fn verify(&self, secret: &str, stored_hash: &str) -> bool {
        constant_time_eq(hash_secret(secret).as_bytes(), stored_hash.as_bytes())
    }
}

/// Hex SHA-256 digest of the whole secret
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// The display prefix of a secret
pub fn display_prefix(secret: &str) -> &str {
    let end = secret
        .char_indices()
        .nth(DISPLAY_PREFIX_LENGTH)
        .map(|(idx, _)| idx)
        .unwrap_or(secret.len());

    &secret[..end]
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
