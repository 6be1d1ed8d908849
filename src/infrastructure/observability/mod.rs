//! Observability infrastructure - Tracing and Metrics
//!
//! Settings live in [`crate::config::ObservabilityConfig`].

mod metrics;
mod tracing_setup;

pub use metrics::{
    create_metrics_router, init_metrics, record_auth_attempt, record_http_request,
    record_rate_limit, record_usage_dropped, PrometheusMetrics,
};
pub use tracing_setup::{init_tracing, shutdown_tracing};
