//! Domain layer - Core gateway types and collaborator contracts

pub mod api_key;
pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod usage;

pub use api_key::{ApiKey, ApiKeyId, ApiKeyRepository, ApiKeyTier, OwnerId};
pub use auth::{AuthContext, Identity, PermissionSet, Role};
pub use error::DomainError;
pub use rate_limit::{FailurePolicy, RateLimitDecision, RateLimitStore};
pub use usage::{UsageLogEntry, UsageSink};
