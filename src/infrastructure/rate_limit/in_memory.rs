//! In-memory counter store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::rate_limit::{
    CounterState, RateLimitCounter, RateLimitKey, RateLimitStore, RateLimitWindow,
};
use crate::domain::DomainError;

/// Number of increments between sweeps of ended windows
const PRUNE_INTERVAL: u64 = 1024;

#[derive(Debug, Default)]
struct Inner {
    counters: HashMap<RateLimitKey, RateLimitCounter>,
    operations: u64,
}

impl Inner {
    fn prune_before(&mut self, before: DateTime<Utc>) -> u64 {
        let len = self.counters.len();
        self.counters.retain(|_, counter| counter.window.end > before);
        (len - self.counters.len()) as u64
    }
}

/// Single-process counter store
///
/// Each `(subject, endpoint)` holds only the counter of its latest window;
/// a request in a newer window replaces it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimitStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counters
    pub async fn len(&self) -> usize {
        self.inner.lock().await.counters.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: &RateLimitWindow,
    ) -> Result<CounterState, DomainError> {
        let mut inner = self.inner.lock().await;

        inner.operations += 1;
        if inner.operations % PRUNE_INTERVAL == 0 {
            inner.prune_before(window.start);
        }

        let counter = inner
            .counters
            .entry(key.clone())
            .or_insert_with(|| RateLimitCounter::new(key.clone(), *window));

        if counter.window.start < window.start {
            *counter = RateLimitCounter::new(key.clone(), *window);
        }

        if counter.count >= u64::from(limit) {
            return Ok(CounterState {
                allowed: false,
                count: counter.count,
            });
        }

        counter.count += 1;

        Ok(CounterState {
            allowed: true,
            count: counter.count,
        })
    }

    async fn current(
        &self,
        key: &RateLimitKey,
        window: &RateLimitWindow,
    ) -> Result<u64, DomainError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .counters
            .get(key)
            .filter(|counter| counter.window.start == window.start)
            .map(|counter| counter.count)
            .unwrap_or(0))
    }

    async fn prune_expired(&self, before: DateTime<Utc>) -> Result<u64, DomainError> {
        Ok(self.inner.lock().await.prune_before(before))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rate_limit::RateLimitSubject;
    use chrono::TimeZone;
    use std::time::Duration;

    const HOUR: Duration = Duration::from_secs(3600);

    fn key(ip: &str) -> RateLimitKey {
        RateLimitKey::new(RateLimitSubject::Ip(ip.to_string()), "/v1/ping")
    }

    fn window_at(secs: i64) -> RateLimitWindow {
        RateLimitWindow::containing(Utc.timestamp_opt(secs, 0).unwrap(), HOUR)
    }

    #[tokio::test]
    async fn test_increments_until_limit() {
        let store = InMemoryRateLimitStore::new();
        let window = window_at(0);

        for expected in 1..=3 {
            let state = store.check_and_increment(&key("a"), 3, &window).await.unwrap();
            assert!(state.allowed);
            assert_eq!(state.count, expected);
        }

        let denied = store.check_and_increment(&key("a"), 3, &window).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 3);
        assert_eq!(store.current(&key("a"), &window).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_zero_limit_denies() {
        let store = InMemoryRateLimitStore::new();
        let state = store
            .check_and_increment(&key("a"), 0, &window_at(0))
            .await
            .unwrap();

        assert!(!state.allowed);
        assert_eq!(state.count, 0);
    }

    #[tokio::test]
    async fn test_new_window_starts_fresh() {
        let store = InMemoryRateLimitStore::new();
        let first = window_at(0);
        let second = window_at(3_600);

        store.check_and_increment(&key("a"), 1, &first).await.unwrap();
        assert!(!store.check_and_increment(&key("a"), 1, &first).await.unwrap().allowed);

        let state = store.check_and_increment(&key("a"), 1, &second).await.unwrap();
        assert!(state.allowed);
        assert_eq!(state.count, 1);
        assert_eq!(store.current(&key("a"), &first).await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_subjects_are_independent() {
        let store = InMemoryRateLimitStore::new();
        let window = window_at(0);

        store.check_and_increment(&key("a"), 1, &window).await.unwrap();
        let other = store.check_and_increment(&key("b"), 1, &window).await.unwrap();

        assert!(other.allowed);
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let store = InMemoryRateLimitStore::new();

        store.check_and_increment(&key("old"), 5, &window_at(0)).await.unwrap();
        store.check_and_increment(&key("new"), 5, &window_at(7_200)).await.unwrap();

        let removed = store
            .prune_expired(Utc.timestamp_opt(7_200, 0).unwrap())
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_exact() {
        let store = InMemoryRateLimitStore::new();
        let window = window_at(0);

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.check_and_increment(&key("a"), 1_000, &window).await.unwrap()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().allowed);
        }

        assert_eq!(store.current(&key("a"), &window).await.unwrap(), 50);
    }
}
