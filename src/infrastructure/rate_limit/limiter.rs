//! Windowed quota enforcement

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::rate_limit::{
    Clock, CounterState, FailurePolicy, RateLimitDecision, RateLimitKey, RateLimitStore,
    RateLimitSubject, RateLimitWindow, SystemClock,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_rate_limit;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Checks and reserves quota against a shared counter store
///
/// The store failure policy is held here once for the whole process.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    failure_policy: FailurePolicy,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.store.backend())
            .field("window", &self.window)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            window: DEFAULT_WINDOW,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count one request for `subject` on `endpoint` if quota remains
    pub async fn check_and_reserve(
        &self,
        subject: RateLimitSubject,
        endpoint: &str,
        limit: u32,
    ) -> Result<RateLimitDecision, DomainError> {
        let window = RateLimitWindow::containing(self.clock.now(), self.window);

        if limit == 0 {
            record_rate_limit("denied");
            return Ok(RateLimitDecision::from_state(
                CounterState {
                    allowed: false,
                    count: 0,
                },
                limit,
                &window,
            ));
        }

        let key = RateLimitKey::new(subject, endpoint);

        match self.store.check_and_increment(&key, limit, &window).await {
            Ok(state) => {
                let decision = RateLimitDecision::from_state(state, limit, &window);

                if decision.allowed {
                    record_rate_limit("allowed");
                } else {
                    debug!(key = %key, count = decision.current_count, limit, "Rate limit exceeded");
                    record_rate_limit("denied");
                }

                Ok(decision)
            }
            Err(e) => self.on_store_failure(&key, limit, &window, e),
        }
    }

    fn on_store_failure(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window: &RateLimitWindow,
        err: DomainError,
    ) -> Result<RateLimitDecision, DomainError> {
        match self.failure_policy {
            FailurePolicy::Open => {
                warn!(
                    key = %key,
                    backend = self.store.backend(),
                    error = %err,
                    "Rate limit store failed, admitting request"
                );
                record_rate_limit("fail_open");

                Ok(RateLimitDecision::from_state(
                    CounterState {
                        allowed: true,
                        count: 0,
                    },
                    limit,
                    window,
                ))
            }
            FailurePolicy::Closed => {
                error!(
                    key = %key,
                    backend = self.store.backend(),
                    error = %err,
                    "Rate limit store failed, rejecting request"
                );
                record_rate_limit("fail_closed");

                Err(DomainError::unavailable(
                    self.store.backend(),
                    err.to_string(),
                ))
            }
        }
    }

    /// Round-trip to the counter store without touching any quota
    pub async fn probe(&self) -> Result<(), DomainError> {
        let window = RateLimitWindow::containing(self.clock.now(), self.window);
        let key = RateLimitKey::new(RateLimitSubject::Ip("readiness-probe".to_string()), "/ready");

        self.store.current(&key, &window).await.map(|_| ())
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Drop counters whose window has ended
    pub async fn prune_expired(&self) -> Result<u64, DomainError> {
        let current = RateLimitWindow::containing(self.clock.now(), self.window);
        self.store.prune_expired(current.start).await
    }

    /// Periodically prune ended windows in the background
    pub fn spawn_pruner(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                interval.tick().await;

                match self.prune_expired().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Pruned expired rate limit counters"),
                    Err(e) => warn!(error = %e, "Failed to prune rate limit counters"),
                }
            }
        })
    }
}
