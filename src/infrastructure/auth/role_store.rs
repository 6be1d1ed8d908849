//! Role lookups for authenticated principals

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::domain::auth::{Role, RoleStore};
use crate::domain::DomainError;

/// In-memory role assignments
#[derive(Debug, Clone, Default)]
pub struct InMemoryRoleStore {
    roles: Arc<RwLock<HashMap<String, Role>>>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn assign(&self, principal_id: impl Into<String>, role: Role) {
        self.roles.write().await.insert(principal_id.into(), role);
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(&self, principal_id: &str) -> Result<Option<Role>, DomainError> {
        Ok(self.roles.read().await.get(principal_id).copied())
    }
}

/// Role assignments in the `user_roles` table
#[derive(Debug, Clone)]
pub struct PostgresRoleStore {
    pool: PgPool,
}

impl PostgresRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a principal's role
    pub async fn assign(&self, principal_id: &str, role: Role) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (principal_id, role, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (principal_id) DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()
            "#,
        )
        .bind(principal_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to assign role: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl RoleStore for PostgresRoleStore {
    async fn get_role(&self, principal_id: &str) -> Result<Option<Role>, DomainError> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE principal_id = $1")
                .bind(principal_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to get role: {}", e)))?;

        role.map(|r| {
            r.parse::<Role>()
                .map_err(|e| DomainError::storage(format!("Invalid role in database: {}", e)))
        })
        .transpose()
    }
}
