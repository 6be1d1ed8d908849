//! Credential resolution for inbound requests
//!
//! Precedence is strict: an `X-Api-Key` header wins over `Authorization`,
//! and a credential that is present but invalid is terminal. Requests
//! without any credential are anonymous.

use std::sync::Arc;

use axum::http::{header, HeaderMap};
use tracing::{debug, warn};

use crate::domain::api_key::{ApiKey, ApiKeyTier};
use crate::domain::auth::{
    AuthContext, PermissionSet, Role, RoleStore, TokenError, TokenValidator, UserPrincipal,
};
use crate::domain::DomainError;
use crate::infrastructure::api_key::ApiKeyService;
use crate::infrastructure::observability::record_auth_attempt;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Why a request could not be authenticated
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error("Invalid or expired API key")]
    InvalidApiKey,

    #[error("Invalid or expired bearer token")]
    InvalidToken,

    /// A collaborator failed; the request is rejected rather than downgraded
    #[error(transparent)]
    Internal(#[from] DomainError),
}

/// Tiers applied to identities that do not carry their own
#[derive(Debug, Clone, Copy)]
pub struct TierDefaults {
    pub anonymous: ApiKeyTier,
    pub user: ApiKeyTier,
}

impl Default for TierDefaults {
    fn default() -> Self {
        Self {
            anonymous: ApiKeyTier::Free,
            user: ApiKeyTier::Basic,
        }
    }
}

/// Resolves request credentials to an [`AuthContext`]
pub struct CredentialAuthenticator {
    api_keys: Arc<ApiKeyService>,
    tokens: Arc<dyn TokenValidator>,
    roles: Arc<dyn RoleStore>,
    tiers: TierDefaults,
}

impl std::fmt::Debug for CredentialAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAuthenticator")
            .field("tiers", &self.tiers)
            .finish_non_exhaustive()
    }
}

impl CredentialAuthenticator {
    pub fn new(
        api_keys: Arc<ApiKeyService>,
        tokens: Arc<dyn TokenValidator>,
        roles: Arc<dyn RoleStore>,
    ) -> Self {
        Self {
            api_keys,
            tokens,
            roles,
            tiers: TierDefaults::default(),
        }
    }

    pub fn with_tiers(mut self, tiers: TierDefaults) -> Self {
        self.tiers = tiers;
        self
    }

    /// Resolve the identity behind a request's headers
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        ip_address: &str,
    ) -> Result<AuthContext, AuthFailure> {
        if let Some(value) = headers.get(API_KEY_HEADER) {
            let result = match value.to_str() {
                Ok(secret) => self.authenticate_api_key(secret.trim(), ip_address).await,
                Err(_) => Err(AuthFailure::InvalidApiKey),
            };
            record_auth_attempt("api_key", outcome(&result));
            return result;
        }

        if let Some(value) = headers.get(header::AUTHORIZATION) {
            let result = match value.to_str().ok().and_then(bearer_token) {
                Some(token) => self.authenticate_bearer(token, ip_address).await,
                None => Err(AuthFailure::InvalidToken),
            };
            record_auth_attempt("bearer", outcome(&result));
            return result;
        }

        record_auth_attempt("anonymous", "success");
        Ok(AuthContext::anonymous(ip_address, self.tiers.anonymous))
    }

    async fn authenticate_api_key(
        &self,
        secret: &str,
        ip_address: &str,
    ) -> Result<AuthContext, AuthFailure> {
        let key = self
            .api_keys
            .verify_key(secret)
            .await?
            .ok_or(AuthFailure::InvalidApiKey)?;

        let permissions = self.key_permissions(&key).await?;

        debug!(key_id = %key.id(), key_prefix = key.key_prefix(), "Authenticated API key");
        Ok(AuthContext::for_api_key(&key, permissions, ip_address))
    }

    async fn authenticate_bearer(
        &self,
        token: &str,
        ip_address: &str,
    ) -> Result<AuthContext, AuthFailure> {
        let principal = self.tokens.validate_token(token).await.map_err(|e| match e {
            TokenError::Invalid(reason) => {
                debug!(reason = %reason, "Rejected bearer token");
                AuthFailure::InvalidToken
            }
            TokenError::Unavailable(reason) => {
                warn!(reason = %reason, "Identity provider unavailable");
                AuthFailure::Internal(DomainError::unavailable("identity provider", reason))
            }
        })?;

        let role = self.role_of(&principal.principal_id).await?;

        debug!(user_id = %principal.principal_id, role = %role, "Authenticated bearer token");
        Ok(AuthContext::for_user(
            UserPrincipal {
                user_id: principal.principal_id,
                email: principal.email,
                role,
            },
            self.tiers.user,
            ip_address,
        ))
    }

    /// A key's explicit permissions, or its owner's role permissions when it has none
    async fn key_permissions(&self, key: &ApiKey) -> Result<PermissionSet, DomainError> {
        if !key.permissions().is_empty() {
            return Ok(key.permissions().clone());
        }

        Ok(self.role_of(key.owner_id().as_str()).await?.permissions())
    }

    async fn role_of(&self, principal_id: &str) -> Result<Role, DomainError> {
        Ok(self.roles.get_role(principal_id).await?.unwrap_or_default())
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn outcome(result: &Result<AuthContext, AuthFailure>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(AuthFailure::Internal(_)) => "error",
        Err(_) => "rejected",
    }
}
