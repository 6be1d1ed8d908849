//! PostgreSQL usage sink

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::usage::{UsageLogEntry, UsageSink};
use crate::domain::DomainError;

/// Appends entries to `api_usage_logs`
#[derive(Debug, Clone)]
pub struct PostgresUsageSink {
    pool: PgPool,
}

impl PostgresUsageSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageSink for PostgresUsageSink {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO api_usage_logs (id, api_key_id, user_id, ip_address, endpoint, method,
                                        status_code, response_time_ms, user_agent,
                                        request_size, response_size, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.api_key_id.map(|id| *id.as_uuid()))
        .bind(&entry.user_id)
        .bind(&entry.ip_address)
        .bind(&entry.endpoint)
        .bind(&entry.method)
        .bind(i32::from(entry.status_code))
        .bind(i64::try_from(entry.response_time_ms).unwrap_or(i64::MAX))
        .bind(&entry.user_agent)
        .bind(entry.request_size.and_then(|s| i64::try_from(s).ok()))
        .bind(entry.response_size.and_then(|s| i64::try_from(s).ok()))
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to append usage log: {}", e)))?;

        Ok(())
    }
}
