//! PostgreSQL counter store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::rate_limit::{CounterState, RateLimitKey, RateLimitStore, RateLimitWindow};
use crate::domain::DomainError;

/// Counter rows in `rate_limit_counters`
///
/// The upsert only increments while `count < limit`; a denied request
/// returns no row and the current count is read back separately.
#[derive(Debug, Clone)]
pub struct PostgresRateLimitStore {
    pool: PgPool,
}

impl PostgresRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: &RateLimitWindow,
    ) -> Result<CounterState, DomainError> {
        let subject = key.subject.to_string();

        let incremented: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_counters (subject, endpoint, window_start, window_end, count)
            SELECT $1, $2, $3, $4, 1
            WHERE $5 > 0
            ON CONFLICT (subject, endpoint, window_start)
            DO UPDATE SET count = rate_limit_counters.count + 1
            WHERE rate_limit_counters.count < $5
            RETURNING count
            "#,
        )
        .bind(&subject)
        .bind(&key.endpoint)
        .bind(window.start)
        .bind(window.end)
        .bind(i64::from(limit))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to increment rate limit counter: {}", e)))?;

        match incremented {
            Some(count) => Ok(CounterState {
                allowed: true,
                count: count.max(0) as u64,
            }),
            None => Ok(CounterState {
                allowed: false,
                count: self.current(key, window).await?,
            }),
        }
    }

    async fn current(
        &self,
        key: &RateLimitKey,
        window: &RateLimitWindow,
    ) -> Result<u64, DomainError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT count FROM rate_limit_counters
            WHERE subject = $1 AND endpoint = $2 AND window_start = $3
            "#,
        )
        .bind(key.subject.to_string())
        .bind(&key.endpoint)
        .bind(window.start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to read rate limit counter: {}", e)))?;

        Ok(count.unwrap_or(0).max(0) as u64)
    }

    async fn prune_expired(&self, before: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_end <= $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to prune rate limit counters: {}", e)))?;

        Ok(result.rows_affected())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
