//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, CounterBackend, LogFormat, LoggingConfig, MetricsConfig,
    ObservabilityConfig, RateLimitConfig, ServerConfig, StorageBackend, StorageConfig,
    TracingConfig, UsageBackend, UsageConfig,
};
