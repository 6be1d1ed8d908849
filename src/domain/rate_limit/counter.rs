//! Rate limit subjects, windows and counter state

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::domain::api_key::ApiKeyId;
use crate::domain::auth::{AuthContext, Identity};

/// The single bucket a request is counted against
///
/// Precedence when resolving from a context: API key, then user, then IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitSubject {
    ApiKey(ApiKeyId),
    User(String),
    Ip(String),
}

impl RateLimitSubject {
    pub fn from_context(ctx: &AuthContext) -> Self {
        match &ctx.identity {
            Identity::ApiKey(principal) => Self::ApiKey(principal.key_id),
            Identity::User(user) => Self::User(user.user_id.clone()),
            Identity::Anonymous => Self::Ip(ctx.ip_address.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::User(_) => "user",
            Self::Ip(_) => "ip",
        }
    }
}

impl fmt::Display for RateLimitSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(id) => write!(f, "key:{}", id),
            Self::User(id) => write!(f, "user:{}", id),
            Self::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Counter identity without the window component
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub subject: RateLimitSubject,
    pub endpoint: String,
}

impl RateLimitKey {
    pub fn new(subject: RateLimitSubject, endpoint: impl Into<String>) -> Self {
        Self {
            subject,
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject, self.endpoint)
    }
}

/// A fixed tumbling window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RateLimitWindow {
    /// Window of length `length` that contains `now`, aligned to the epoch
    pub fn containing(now: DateTime<Utc>, length: Duration) -> Self {
        let length_secs = length.as_secs().max(1) as i64;
        let start_secs = now.timestamp().div_euclid(length_secs) * length_secs;

        let start = Utc
            .timestamp_opt(start_secs, 0)
            .single()
            .unwrap_or(now);

        Self {
            start,
            end: start + chrono::Duration::seconds(length_secs),
        }
    }

    pub fn length_secs(&self) -> u64 {
        (self.end - self.start).num_seconds().max(0) as u64
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Persistent counter row
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitCounter {
    pub key: RateLimitKey,
    pub window: RateLimitWindow,
    pub count: u64,
}

impl RateLimitCounter {
    pub fn new(key: RateLimitKey, window: RateLimitWindow) -> Self {
        Self {
            key,
            window,
            count: 0,
        }
    }

    pub fn reset_time(&self) -> DateTime<Utc> {
        self.window.end
    }
}

/// Outcome of the store's atomic check-and-increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterState {
    pub allowed: bool,
    /// Count after the operation (unchanged when denied)
    pub count: u64,
}

/// Allow/deny answer returned to the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub current_count: u64,
    pub limit: u32,
    pub remaining: u64,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitDecision {
    pub fn from_state(state: CounterState, limit: u32, window: &RateLimitWindow) -> Self {
        Self {
            allowed: state.allowed,
            current_count: state.count,
            limit,
            remaining: u64::from(limit).saturating_sub(state.count),
            reset_time: window.end,
        }
    }

    /// Epoch seconds at which the window resets
    pub fn reset_epoch_secs(&self) -> i64 {
        self.reset_time.timestamp()
    }

    /// Whole seconds until reset, rounded up, at least 1 while the reset is pending
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds();

        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::ApiKeyTier;
    use crate::domain::auth::{Role, UserPrincipal};

    const HOUR: Duration = Duration::from_secs(3600);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_window_alignment() {
        let window = RateLimitWindow::containing(at(7_200 + 1_234), HOUR);

        assert_eq!(window.start, at(7_200));
        assert_eq!(window.end, at(10_800));
        assert_eq!(window.length_secs(), 3600);
    }

    #[test]
    fn test_window_boundary_starts_new_window() {
        let first = RateLimitWindow::containing(at(10_799), HOUR);
        let second = RateLimitWindow::containing(at(10_800), HOUR);

        assert_ne!(first, second);
        assert_eq!(first.end, second.start);
        assert!(first.contains(at(10_799)));
        assert!(!first.contains(at(10_800)));
    }

    #[test]
    fn test_subject_precedence_from_context() {
        let anon = AuthContext::anonymous("192.0.2.7", ApiKeyTier::Free);
        assert_eq!(
            RateLimitSubject::from_context(&anon),
            RateLimitSubject::Ip("192.0.2.7".to_string())
        );

        let user = AuthContext::for_user(
            UserPrincipal {
                user_id: "u-1".to_string(),
                email: None,
                role: Role::User,
            },
            ApiKeyTier::Basic,
            "192.0.2.7",
        );
        assert_eq!(
            RateLimitSubject::from_context(&user),
            RateLimitSubject::User("u-1".to_string())
        );
    }

    #[test]
    fn test_key_display() {
        let key = RateLimitKey::new(RateLimitSubject::Ip("::1".to_string()), "/v1/ping");
        assert_eq!(key.to_string(), "ip:::1:/v1/ping");
    }

    #[test]
    fn test_decision_remaining_and_retry_after() {
        let window = RateLimitWindow::containing(at(3_600), HOUR);
        let decision = RateLimitDecision::from_state(
            CounterState {
                allowed: true,
                count: 40,
            },
            100,
            &window,
        );

        assert_eq!(decision.remaining, 60);
        assert_eq!(decision.reset_epoch_secs(), 7_200);
        assert_eq!(decision.retry_after_secs(at(3_600)), 3_600);
        assert_eq!(decision.retry_after_secs(at(7_199)), 1);
        assert_eq!(decision.retry_after_secs(at(7_200)), 0);
    }

    #[test]
    fn test_remaining_never_underflows() {
        let window = RateLimitWindow::containing(at(0), HOUR);
        let decision = RateLimitDecision::from_state(
            CounterState {
                allowed: false,
                count: 5,
            },
            3,
            &window,
        );

        assert_eq!(decision.remaining, 0);
    }
}
