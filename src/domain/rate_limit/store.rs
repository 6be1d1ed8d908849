//! Counter store contract

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::counter::{CounterState, RateLimitKey, RateLimitWindow};
use crate::domain::DomainError;

/// Shared counter storage
///
/// `check_and_increment` must be a single atomic operation: concurrent calls
/// for the same key and window never admit more than `limit` requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Deny without incrementing when `count >= limit`, otherwise increment and allow.
    async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: &RateLimitWindow,
    ) -> Result<CounterState, DomainError>;

    /// Current count for the window, zero when no counter exists
    async fn current(&self, key: &RateLimitKey, window: &RateLimitWindow)
        -> Result<u64, DomainError>;

    /// Drop counters whose window ended before `before`; returns the number removed
    async fn prune_expired(&self, before: DateTime<Utc>) -> Result<u64, DomainError>;

    /// Backend name used in logs and errors
    fn backend(&self) -> &'static str;
}
