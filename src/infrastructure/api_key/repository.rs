//! In-memory API key repository implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository, OwnerId};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Inner {
    keys: HashMap<ApiKeyId, ApiKey>,
    hash_index: HashMap<String, ApiKeyId>,
}

/// In-memory implementation of ApiKeyRepository
#[derive(Debug, Clone, Default)]
pub struct InMemoryApiKeyRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let inner = self.inner.read().await;
        Ok(inner.keys.get(id).cloned())
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let inner = self.inner.read().await;

        Ok(inner
            .hash_index
            .get(key_hash)
            .and_then(|id| inner.keys.get(id))
            .cloned())
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut inner = self.inner.write().await;

        if inner.keys.contains_key(api_key.id()) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                api_key.id()
            )));
        }

        if inner.hash_index.contains_key(api_key.key_hash()) {
            return Err(DomainError::conflict("API key digest already exists"));
        }

        inner
            .hash_index
            .insert(api_key.key_hash().to_string(), *api_key.id());
        inner.keys.insert(*api_key.id(), api_key.clone());

        Ok(api_key)
    }

    async fn deactivate(&self, id: &ApiKeyId) -> Result<bool, DomainError> {
        let mut inner = self.inner.write().await;

        match inner.keys.get_mut(id) {
            Some(key) => {
                key.revoke();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &ApiKeyId) -> Result<bool, DomainError> {
        let mut inner = self.inner.write().await;

        match inner.keys.remove(id) {
            Some(key) => {
                inner.hash_index.remove(key.key_hash());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        let inner = self.inner.read().await;

        let mut keys: Vec<ApiKey> = inner
            .keys
            .values()
            .filter(|k| k.is_owned_by(owner_id))
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.created_at());

        Ok(keys)
    }

    async fn touch_last_used(&self, id: &ApiKeyId, at: DateTime<Utc>) -> Result<(), DomainError> {
        let mut inner = self.inner.write().await;

        match inner.keys.get_mut(id) {
            Some(key) => {
                key.record_usage(at);
                Ok(())
            }
            None => Err(DomainError::not_found(format!("API key '{}' not found", id))),
        }
    }
}
