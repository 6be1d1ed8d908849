//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::api_key::ApiKeyService;
use crate::infrastructure::auth::CredentialAuthenticator;
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::usage::UsageRecorder;

/// Services built once at startup and shared by every request
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyService>,
    pub authenticator: Arc<CredentialAuthenticator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub usage: UsageRecorder,
    /// Whether forwarding headers identify the client
    pub trust_proxy: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("authenticator", &self.authenticator)
            .field("rate_limiter", &self.rate_limiter)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        api_keys: Arc<ApiKeyService>,
        authenticator: Arc<CredentialAuthenticator>,
        rate_limiter: Arc<RateLimiter>,
        usage: UsageRecorder,
    ) -> Self {
        Self {
            api_keys,
            authenticator,
            rate_limiter,
            usage,
            trust_proxy: false,
        }
    }

    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }
}
