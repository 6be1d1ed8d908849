//! Identity provider collaborators

use async_trait::async_trait;

use super::permission::Role;
use crate::domain::DomainError;

/// Principal resolved from a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPrincipal {
    pub principal_id: String,
    pub email: Option<String>,
}

/// Why a bearer token was not accepted
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token is malformed, expired or signed with another key
    #[error("invalid token: {0}")]
    Invalid(String),

    /// The identity provider could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Validates bearer tokens against the identity provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate_token(&self, token: &str) -> Result<TokenPrincipal, TokenError>;
}

/// Looks up the role assigned to a principal
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Returns `None` when the principal has no explicit role
    async fn get_role(&self, principal_id: &str) -> Result<Option<Role>, DomainError>;
}
