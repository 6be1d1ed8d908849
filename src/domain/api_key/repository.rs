//! API key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::entity::{ApiKey, ApiKeyId, OwnerId};
use crate::domain::DomainError;

/// Persistence for API keys, addressed by id or by secret digest
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Get a key by ID
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    /// Find a key by the digest of its secret
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Persist a new key
    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Mark a key inactive; returns false when the key does not exist
    async fn deactivate(&self, id: &ApiKeyId) -> Result<bool, DomainError>;

    /// Hard delete a key; returns false when the key does not exist
    async fn delete(&self, id: &ApiKeyId) -> Result<bool, DomainError>;

    /// List keys belonging to an owner, oldest first
    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError>;

    /// Set `last_used_at`
    async fn touch_last_used(&self, id: &ApiKeyId, at: DateTime<Utc>) -> Result<(), DomainError>;
}
