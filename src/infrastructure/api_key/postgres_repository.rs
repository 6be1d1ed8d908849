//! PostgreSQL API key repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository, ApiKeyTier, OwnerId};
use crate::domain::auth::PermissionSet;
use crate::domain::DomainError;

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, name, key_hash, key_prefix, tier, rate_limit_per_hour,
           permissions, is_active, expires_at, last_used_at, created_at
    FROM api_keys
"#;

/// PostgreSQL implementation of ApiKeyRepository
#[derive(Debug, Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE key_hash = $1", SELECT_COLUMNS))
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to look up API key: {}", e)))?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let permissions: Vec<String> = api_key.permissions().iter().map(str::to_string).collect();

        sqlx::query(
            r#"
            INSERT INTO api_keys (id, owner_id, name, key_hash, key_prefix, tier,
                                  rate_limit_per_hour, permissions, is_active,
                                  expires_at, last_used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(api_key.id().as_uuid())
        .bind(api_key.owner_id().as_str())
        .bind(api_key.name())
        .bind(api_key.key_hash())
        .bind(api_key.key_prefix())
        .bind(api_key.tier().as_str())
        .bind(i64::from(api_key.rate_limit_per_hour()))
        .bind(&permissions)
        .bind(api_key.is_active())
        .bind(api_key.expires_at())
        .bind(api_key.last_used_at())
        .bind(api_key.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();

            if msg.contains("duplicate key") || msg.contains("unique constraint") {
                DomainError::conflict(format!("API key '{}' already exists", api_key.id()))
            } else {
                DomainError::storage(format!("Failed to create API key: {}", e))
            }
        })?;

        Ok(api_key)
    }

    async fn deactivate(&self, id: &ApiKeyId) -> Result<bool, DomainError> {
        let result = sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to revoke API key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &ApiKeyId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete API key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE owner_id = $1 ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list API keys: {}", e)))?;

        rows.iter().map(row_to_api_key).collect()
    }

    async fn touch_last_used(&self, id: &ApiKeyId, at: DateTime<Utc>) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to record API key usage: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        Ok(())
    }
}

fn row_to_api_key(row: &sqlx::postgres::PgRow) -> Result<ApiKey, DomainError> {
    let id: Uuid = row.get("id");
    let owner_id: String = row.get("owner_id");
    let name: String = row.get("name");
    let key_hash: String = row.get("key_hash");
    let key_prefix: String = row.get("key_prefix");
    let tier: String = row.get("tier");
    let rate_limit_per_hour: i64 = row.get("rate_limit_per_hour");
    let permissions: Vec<String> = row.get("permissions");
    let is_active: bool = row.get("is_active");
    let expires_at: Option<DateTime<Utc>> = row.get("expires_at");
    let last_used_at: Option<DateTime<Utc>> = row.get("last_used_at");
    let created_at: DateTime<Utc> = row.get("created_at");

    let tier: ApiKeyTier = tier
        .parse()
        .map_err(|e| DomainError::storage(format!("Invalid tier in database: {}", e)))?;
    let rate_limit_per_hour = u32::try_from(rate_limit_per_hour).map_err(|_| {
        DomainError::storage(format!(
            "Invalid rate limit in database: {}",
            rate_limit_per_hour
        ))
    })?;

    Ok(ApiKey::restore(
        ApiKeyId::from_uuid(id),
        OwnerId::new(owner_id),
        name,
        key_hash,
        key_prefix,
        tier,
        rate_limit_per_hour,
        permissions.into_iter().collect::<PermissionSet>(),
        is_active,
        expires_at,
        last_used_at,
        created_at,
    ))
}
