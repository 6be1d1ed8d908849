//! Gateway middleware
//!
//! Authenticates, rate-limits and audits every request routed through it.
//! Installed with `route_layer` so the matched route template is available
//! as the rate-limit endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::middleware::route_path;
use super::state::AppState;
use super::types::ApiError;
use crate::domain::auth::AuthContext;
use crate::domain::rate_limit::{RateLimitDecision, RateLimitSubject};
use crate::domain::usage::UsageLogEntry;
use crate::infrastructure::auth::CredentialAuthenticator;
use crate::infrastructure::rate_limit::RateLimiter;
use crate::infrastructure::usage::UsageRecorder;

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const UNKNOWN_CLIENT: &str = "unknown";

/// Collaborators the gateway middleware runs against
#[derive(Clone)]
pub struct GatewayLayerState {
    authenticator: Arc<CredentialAuthenticator>,
    limiter: Arc<RateLimiter>,
    usage: UsageRecorder,
    limit_override: Option<u32>,
    trust_proxy: bool,
}

impl std::fmt::Debug for GatewayLayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayLayerState")
            .field("limiter", &self.limiter)
            .field("limit_override", &self.limit_override)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}

impl GatewayLayerState {
    pub fn new(
        authenticator: Arc<CredentialAuthenticator>,
        limiter: Arc<RateLimiter>,
        usage: UsageRecorder,
    ) -> Self {
        Self {
            authenticator,
            limiter,
            usage,
            limit_override: None,
            trust_proxy: false,
        }
    }

    pub fn from_app_state(state: &AppState) -> Self {
        Self::new(
            state.authenticator.clone(),
            state.rate_limiter.clone(),
            state.usage.clone(),
        )
        .with_trust_proxy(state.trust_proxy)
    }

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only enable behind a reverse proxy that overwrites those headers.
    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    /// Fixed hourly quota for the routes this layer guards, replacing the
    /// identity's own quota
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit_override = Some(limit);
        self
    }
}

/// Request facts captured before the request is handed downstream
struct RequestFacts {
    started: Instant,
    ip_address: String,
    endpoint: String,
    method: String,
    user_agent: Option<String>,
    request_size: Option<u64>,
}

impl RequestFacts {
    fn capture(request: &Request<Body>, trust_proxy: bool) -> Self {
        Self {
            started: Instant::now(),
            ip_address: client_ip(request, trust_proxy),
            endpoint: route_path(request),
            method: request.method().to_string(),
            user_agent: header_str(request.headers(), &header::USER_AGENT).map(str::to_string),
            request_size: content_length(request.headers()),
        }
    }

    fn entry(&self, status: StatusCode, response_size: Option<u64>) -> UsageLogEntry {
        UsageLogEntry::new(
            self.ip_address.clone(),
            self.endpoint.clone(),
            self.method.clone(),
            status.as_u16(),
        )
        .with_response_time_ms(self.started.elapsed().as_millis() as u64)
        .with_user_agent(self.user_agent.clone())
        .with_sizes(self.request_size, response_size)
    }
}

/// Authenticate, then reserve quota, then run the handler, then record usage
pub async fn gateway_middleware(
    State(gateway): State<GatewayLayerState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let facts = RequestFacts::capture(&request, gateway.trust_proxy);

    let ctx = match gateway
        .authenticator
        .authenticate(request.headers(), &facts.ip_address)
        .await
    {
        Ok(ctx) => ctx,
        Err(failure) => {
            let error = ApiError::from(failure);
            let entry = facts
                .entry(error.status, None)
                .with_error(error.response.message.clone());
            gateway.usage.record(entry);
            return error.into_response();
        }
    };

    let limit = gateway.limit_override.unwrap_or(ctx.rate_limit_per_hour);
    let subject = RateLimitSubject::from_context(&ctx);

    let decision = match gateway
        .limiter
        .check_and_reserve(subject, &facts.endpoint, limit)
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            let error = ApiError::from(e);
            record_rejection(&gateway, &facts, &ctx, &error);
            return error.into_response();
        }
    };

    if !decision.allowed {
        debug!(
            endpoint = %facts.endpoint,
            identity = ctx.identity.kind(),
            limit,
            "Request rejected by rate limit"
        );

        let now = gateway.limiter.now();
        let error = ApiError::rate_limited(&decision, now);
        record_rejection(&gateway, &facts, &ctx, &error);

        let mut response = error.into_response();
        apply_rate_limit_headers(response.headers_mut(), &decision);
        if let Ok(value) = HeaderValue::from_str(&decision.retry_after_secs(now).to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);

    let status = response.status();
    let mut entry = facts
        .entry(status, content_length(response.headers()))
        .with_context(&ctx);
    if entry.is_error() {
        entry = entry.with_error(status.canonical_reason().unwrap_or("request failed"));
    }

    if !gateway.usage.record(entry) {
        warn!(endpoint = %facts.endpoint, "Usage entry dropped");
    }

    response
}

fn record_rejection(
    gateway: &GatewayLayerState,
    facts: &RequestFacts,
    ctx: &AuthContext,
    error: &ApiError,
) {
    let entry = facts
        .entry(error.status, None)
        .with_context(ctx)
        .with_error(error.response.message.clone());
    gateway.usage.record(entry);
}

fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let values = [
        (RATE_LIMIT_LIMIT, decision.limit.to_string()),
        (RATE_LIMIT_REMAINING, decision.remaining.to_string()),
        (RATE_LIMIT_RESET, decision.reset_epoch_secs().to_string()),
    ];

    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// Client address used for anonymous quotas and the audit log
///
/// Forwarding headers are client-controlled, so they are read only when
/// `trust_proxy` is set. Otherwise the TCP peer is used.
pub fn client_ip<B>(request: &Request<B>, trust_proxy: bool) -> String {
    if trust_proxy && let Some(ip) = forwarded_ip(request.headers()) {
        return ip;
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    if let Some(hop) = forwarded {
        return Some(hop.to_string());
    }

    header_str(headers, "x-real-ip")
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn header_str<'a, K>(headers: &'a HeaderMap, name: K) -> Option<&'a str>
where
    K: header::AsHeaderName,
{
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, &header::CONTENT_LENGTH).and_then(|v| v.parse().ok())
}
