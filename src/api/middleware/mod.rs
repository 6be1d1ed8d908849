//! Cross-cutting HTTP middleware

pub mod logging;
pub mod metrics;
pub mod security;

use axum::extract::MatchedPath;
use axum::http::Request;

pub use logging::{logging_middleware, redact_headers};
pub use metrics::metrics_middleware;
pub use security::security_headers_middleware;

/// Route template when matched (`/v1/keys/{id}`), else the raw path
pub fn route_path<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}
