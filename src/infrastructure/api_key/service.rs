//! API Key service
//!
//! Issues, verifies and manages the lifecycle of API keys.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::api_key::{
    is_well_formed_secret, ApiKey, ApiKeyId, ApiKeyRepository, ApiKeyTier,
    ApiKeyValidationError, OwnerId,
};
use crate::domain::auth::PermissionSet;
use crate::domain::DomainError;

use super::generator::{hash_secret, ApiKeyGenerator};

/// Result of creating a new API key
#[derive(Debug)]
pub struct CreatedApiKey {
    /// The API key entity (without the secret)
    pub api_key: ApiKey,
    /// The full secret key (only returned once)
    pub secret: String,
}

/// Parameters for issuing a key with non-default quota or permissions
#[derive(Debug, Clone)]
pub struct CreateApiKeyParams {
    pub owner_id: OwnerId,
    pub name: String,
    pub tier: ApiKeyTier,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit_per_hour: Option<u32>,
    pub permissions: PermissionSet,
}

impl CreateApiKeyParams {
    pub fn new(owner_id: OwnerId, name: impl Into<String>, tier: ApiKeyTier) -> Self {
        Self {
            owner_id,
            name: name.into(),
            tier,
            expires_at: None,
            rate_limit_per_hour: None,
            permissions: PermissionSet::new(),
        }
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_rate_limit_per_hour(mut self, limit: u32) -> Self {
        self.rate_limit_per_hour = Some(limit);
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }
}

/// API Key service for managing API keys
pub struct ApiKeyService {
    repository: Arc<dyn ApiKeyRepository>,
    generator: ApiKeyGenerator,
}

impl std::fmt::Debug for ApiKeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService").finish_non_exhaustive()
    }
}

impl ApiKeyService {
    /// Create a new API key service
    pub fn new(repository: Arc<dyn ApiKeyRepository>) -> Self {
        Self {
            repository,
            generator: ApiKeyGenerator::new(),
        }
    }

    /// Issue a key with the tier's default quota
    pub async fn create_key(
        &self,
        owner_id: OwnerId,
        name: impl Into<String>,
        tier: ApiKeyTier,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<CreatedApiKey, DomainError> {
        let mut params = CreateApiKeyParams::new(owner_id, name, tier);
        params.expires_at = expires_at;

        self.create_key_with(params).await
    }

    /// Issue a key with explicit quota and permission overrides
    pub async fn create_key_with(
        &self,
        params: CreateApiKeyParams,
    ) -> Result<CreatedApiKey, DomainError> {
        if params.rate_limit_per_hour == Some(0) {
            return Err(ApiKeyValidationError::ZeroRateLimit.into());
        }

        if params.expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(ApiKeyValidationError::ExpiryInPast.into());
        }

        let generated = self.generator.generate();

        let mut api_key = ApiKey::new(
            params.owner_id,
            params.name,
            generated.hash,
            generated.prefix,
            params.tier,
        )?
        .with_permissions(params.permissions);

        if let Some(limit) = params.rate_limit_per_hour {
            api_key = api_key.with_rate_limit_per_hour(limit);
        }

        if let Some(expires_at) = params.expires_at {
            api_key = api_key.with_expiration(expires_at);
        }

        let created = self.repository.create(api_key).await?;

        info!(
            key_id = %created.id(),
            owner_id = %created.owner_id(),
            key_prefix = created.key_prefix(),
            tier = %created.tier(),
            "API key created"
        );

        Ok(CreatedApiKey {
            api_key: created,
            secret: generated.secret,
        })
    }

    /// Resolve a presented secret to a usable key
    ///
    /// Malformed secrets are rejected before any repository access.
    pub async fn verify_key(&self, secret: &str) -> Result<Option<ApiKey>, DomainError> {
        if !is_well_formed_secret(secret) {
            debug!("Rejected malformed API key");
            return Ok(None);
        }

        let Some(mut key) = self.repository.find_by_hash(&hash_secret(secret)).await? else {
            debug!("No API key matches presented secret");
            return Ok(None);
        };

        // Constant-time confirmation of the digest match
        if !self.generator.verify(secret, key.key_hash()) {
            return Ok(None);
        }

        let now = Utc::now();

        if !key.is_usable_at(now) {
            debug!(
                key_id = %key.id(),
                active = key.is_active(),
                "API key is revoked or expired"
            );
            return Ok(None);
        }

        // Off the request path; a failed touch never rejects the key
        let repository = self.repository.clone();
        let key_id = *key.id();
        tokio::spawn(async move {
            if let Err(e) = repository.touch_last_used(&key_id, now).await {
                warn!(key_id = %key_id, error = %e, "Failed to record API key usage");
            }
        });
        key.record_usage(now);

        Ok(Some(key))
    }

    /// Get a key owned by `owner_id`
    pub async fn get_key(
        &self,
        key_id: &ApiKeyId,
        owner_id: &OwnerId,
    ) -> Result<ApiKey, DomainError> {
        self.repository
            .get(key_id)
            .await?
            .filter(|key| key.is_owned_by(owner_id))
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", key_id)))
    }

    /// List keys owned by `owner_id`
    pub async fn list_keys(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        self.repository.list_by_owner(owner_id).await
    }

    /// Deactivate a key; revoking an already revoked key succeeds
    pub async fn revoke_key(
        &self,
        key_id: &ApiKeyId,
        owner_id: &OwnerId,
    ) -> Result<ApiKey, DomainError> {
        let mut key = self.get_key(key_id, owner_id).await?;

        if key.is_active() {
            if !self.repository.deactivate(key_id).await? {
                return Err(DomainError::not_found(format!("API key '{}' not found", key_id)));
            }
            info!(key_id = %key_id, owner_id = %owner_id, "API key revoked");
        }

        key.revoke();
        Ok(key)
    }

    /// Permanently remove a key
    pub async fn delete_key(
        &self,
        key_id: &ApiKeyId,
        owner_id: &OwnerId,
    ) -> Result<(), DomainError> {
        self.get_key(key_id, owner_id).await?;

        if !self.repository.delete(key_id).await? {
            return Err(DomainError::not_found(format!("API key '{}' not found", key_id)));
        }

        info!(key_id = %key_id, owner_id = %owner_id, "API key deleted");
        Ok(())
    }
}
