//! API key validation utilities

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur during API key validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key name cannot be empty")]
    EmptyName,

    #[error("API key name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("Rate limit must be greater than zero")]
    ZeroRateLimit,

    #[error("Expiration must be in the future")]
    ExpiryInPast,
}

impl From<ApiKeyValidationError> for DomainError {
    fn from(err: ApiKeyValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}

pub const MAX_KEY_NAME_LENGTH: usize = 100;

/// Fixed prefix of every issued secret
pub const SECRET_PREFIX: &str = "gdk_";

/// Length of the hex body following the prefix (32 random bytes)
pub const SECRET_BODY_LENGTH: usize = 64;

/// Number of secret characters kept in clear for display
pub const DISPLAY_PREFIX_LENGTH: usize = SECRET_PREFIX.len() + 8;

/// Validate a human-readable key label
pub fn validate_key_name(name: &str) -> Result<(), ApiKeyValidationError> {
    if name.trim().is_empty() {
        return Err(ApiKeyValidationError::EmptyName);
    }

    if name.chars().count() > MAX_KEY_NAME_LENGTH {
        return Err(ApiKeyValidationError::NameTooLong(MAX_KEY_NAME_LENGTH));
    }

    Ok(())
}

/// Check that a presented secret has the issued shape: prefix + 64 lowercase hex chars.
///
/// Runs in constant time relative to storage: no lookup happens for input
/// that fails this check.
pub fn is_well_formed_secret(secret: &str) -> bool {
    let Some(body) = secret.strip_prefix(SECRET_PREFIX) else {
        return false;
    };

    body.len() == SECRET_BODY_LENGTH
        && body
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_secret() -> String {
        format!("{}{}", SECRET_PREFIX, "ab01".repeat(16))
    }

    #[test]
    fn test_valid_names() {
        assert!(validate_key_name("Dexcom bridge").is_ok());
        assert!(validate_key_name(&"x".repeat(MAX_KEY_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(validate_key_name(""), Err(ApiKeyValidationError::EmptyName));
        assert_eq!(validate_key_name("  \t"), Err(ApiKeyValidationError::EmptyName));
        assert_eq!(
            validate_key_name(&"x".repeat(MAX_KEY_NAME_LENGTH + 1)),
            Err(ApiKeyValidationError::NameTooLong(MAX_KEY_NAME_LENGTH))
        );
    }

    #[test]
    fn test_well_formed_secret() {
        assert!(is_well_formed_secret(&valid_secret()));
    }

    #[test]
    fn test_malformed_secrets() {
        assert!(!is_well_formed_secret("not-a-valid-format"));
        assert!(!is_well_formed_secret(""));
        assert!(!is_well_formed_secret(SECRET_PREFIX));
        // wrong prefix
        assert!(!is_well_formed_secret(&format!("sk_{}", "ab01".repeat(16))));
        // too short / too long
        assert!(!is_well_formed_secret(&format!("{}{}", SECRET_PREFIX, "ab".repeat(31))));
        assert!(!is_well_formed_secret(&format!("{}{}", SECRET_PREFIX, "ab".repeat(33))));
        // uppercase hex is not issued
        assert!(!is_well_formed_secret(&format!("{}{}", SECRET_PREFIX, "AB01".repeat(16))));
        // non-hex
        assert!(!is_well_formed_secret(&format!("{}{}", SECRET_PREFIX, "zz01".repeat(16))));
    }

    #[test]
    fn test_display_prefix_length() {
        assert_eq!(DISPLAY_PREFIX_LENGTH, 12);
    }
}
