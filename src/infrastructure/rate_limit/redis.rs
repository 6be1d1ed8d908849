//! Redis counter store
//!
//! One key per `(subject, endpoint, window_start)`; the check and the
//! increment run inside a single Lua script so concurrent gateways never
//! over-admit.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::domain::rate_limit::{CounterState, RateLimitKey, RateLimitStore, RateLimitWindow};
use crate::domain::DomainError;

/// Returns `{allowed, count}`; the key expires when its window ends.
const CHECK_AND_INCREMENT_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return {0, current}
end
current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIREAT', KEYS[1], ARGV[2])
end
return {1, current}
"#;

/// Redis-backed counter store shared by every gateway instance
#[derive(Clone)]
pub struct RedisRateLimitStore {
    connection: ConnectionManager,
    key_prefix: String,
    script: Script,
}

impl fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRateLimitStore")
            .field("key_prefix", &self.key_prefix)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisRateLimitStore {
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, DomainError> {
        let client = Client::open(url).map_err(|e| {
            DomainError::unavailable("redis", format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            DomainError::unavailable("redis", format!("Failed to connect to Redis: {}", e))
        })?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            script: Script::new(CHECK_AND_INCREMENT_SCRIPT),
        })
    }

    fn redis_key(&self, key: &RateLimitKey, window: &RateLimitWindow) -> String {
        counter_key(&self.key_prefix, key, window)
    }
}

fn counter_key(prefix: &str, key: &RateLimitKey, window: &RateLimitWindow) -> String {
    format!("{}:{}:{}", prefix, key, window.start.timestamp())
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: &RateLimitWindow,
    ) -> Result<CounterState, DomainError> {
        let mut conn = self.connection.clone();

        let (allowed, count): (i64, i64) = self
            .script
            .key(self.redis_key(key, window))
            .arg(limit)
            .arg(window.end.timestamp())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                DomainError::unavailable("redis", format!("Rate limit script failed: {}", e))
            })?;

        Ok(CounterState {
            allowed: allowed == 1,
            count: count.max(0) as u64,
        })
    }

    async fn current(
        &self,
        key: &RateLimitKey,
        window: &RateLimitWindow,
    ) -> Result<u64, DomainError> {
        let mut conn = self.connection.clone();

        let count: Option<u64> = conn.get(self.redis_key(key, window)).await.map_err(|e| {
            DomainError::unavailable("redis", format!("Failed to read counter: {}", e))
        })?;

        Ok(count.unwrap_or(0))
    }

    async fn prune_expired(&self, _before: DateTime<Utc>) -> Result<u64, DomainError> {
        // Keys carry EXPIREAT at their window end
        Ok(0)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
