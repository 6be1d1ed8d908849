//! API Key domain
//!
//! Types and traits for API key lifecycle: tiers, the key entity, secret
//! format rules and the persistence contract.

mod entity;
mod repository;
mod validation;

pub use entity::{ApiKey, ApiKeyId, ApiKeyTier, OwnerId};
pub use repository::ApiKeyRepository;
#[cfg(test)]
pub use repository::MockApiKeyRepository;
pub use validation::{
    is_well_formed_secret, validate_key_name, ApiKeyValidationError, DISPLAY_PREFIX_LENGTH,
    MAX_KEY_NAME_LENGTH, SECRET_BODY_LENGTH, SECRET_PREFIX,
};
