use serde::Deserialize;

use crate::domain::api_key::ApiKeyTier;
use crate::domain::rate_limit::FailurePolicy;
use crate::infrastructure::usage::DEFAULT_CHANNEL_CAPACITY;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Trust `X-Forwarded-For` / `X-Real-IP`; only behind a reverse proxy
    #[serde(default)]
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// Where keys and roles live
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Required when any component uses PostgreSQL
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    #[default]
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub backend: CounterBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// How often ended windows are swept from the counter store
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub jwt_audience: Option<String>,
    #[serde(default = "default_token_hours")]
    pub token_expiration_hours: u64,
    #[serde(default = "default_anonymous_tier")]
    pub anonymous_tier: ApiKeyTier,
    #[serde(default = "default_user_tier")]
    pub user_tier: ApiKeyTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageBackend {
    #[default]
    Tracing,
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageConfig {
    #[serde(default)]
    pub backend: UsageBackend,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Prometheus endpoint and OTLP trace export
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Served outside the gateway, next to the health probes
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Fraction of root spans exported, clamped to `0.0..=1.0`
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_window_secs() -> u64 {
    3600
}

fn default_key_prefix() -> String {
    "ratelimit".to_string()
}

fn default_prune_interval_secs() -> u64 {
    300
}

fn default_token_hours() -> u64 {
    24
}

fn default_anonymous_tier() -> ApiKeyTier {
    ApiKeyTier::Free
}

fn default_user_tier() -> ApiKeyTier {
    ApiKeyTier::Basic
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            trust_proxy: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackend::default(),
            redis_url: default_redis_url(),
            window_secs: default_window_secs(),
            failure_policy: FailurePolicy::default(),
            key_prefix: default_key_prefix(),
            prune_interval_secs: default_prune_interval_secs(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_audience: None,
            token_expiration_hours: default_token_hours(),
            anonymous_tier: default_anonymous_tier(),
            user_tier: default_user_tier(),
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            backend: UsageBackend::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            path: default_metrics_path(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl AppConfig {
    /// Layered load: `config/default`, then `config/local`, then `APP__SECTION__KEY`
    ///
    /// Any unparseable value is an error; nothing falls back to defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, config::ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Whether any component needs a PostgreSQL pool
    pub fn needs_postgres(&self) -> bool {
        self.storage.backend == StorageBackend::Postgres
            || self.rate_limit.backend == CounterBackend::Postgres
            || self.usage.backend == UsageBackend::Postgres
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 8080);
        assert!(!config.server.trust_proxy);
        assert_eq!(config.rate_limit.window_secs, 3600);
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Closed);
        assert_eq!(config.rate_limit.backend, CounterBackend::Memory);
        assert_eq!(config.auth.anonymous_tier, ApiKeyTier::Free);
        assert_eq!(config.auth.user_tier, ApiKeyTier::Basic);
        assert_eq!(config.usage.channel_capacity, 1024);
        assert!(config.observability.metrics.enabled);
        assert_eq!(config.observability.metrics.path, "/metrics");
        assert!(!config.observability.tracing.enabled);
        assert_eq!(config.observability.tracing.service_name, "glyco-gateway");
        assert!(!config.needs_postgres());
    }

    fn from_toml(document: &str) -> Result<AppConfig, config::ConfigError> {
        AppConfig::from_builder(
            config::Config::builder()
                .add_source(config::File::from_str(document, config::FileFormat::Toml)),
        )
    }

    #[test]
    fn test_load_rejects_invalid_failure_policy() {
        let result = from_toml("[rate_limit]\nfailure_policy = \"opne\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_rejects_unknown_storage_backend() {
        assert!(from_toml("[storage]\nbackend = \"sqlite\"\n").is_err());
    }

    #[test]
    fn test_load_reads_toml_sections() {
        let config = from_toml(
            "[server]\nhost = \"127.0.0.1\"\nport = 9000\ntrust_proxy = true\n\n[rate_limit]\nfailure_policy = \"open\"\n",
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(config.server.trust_proxy);
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Open);
        assert_eq!(config.rate_limit.window_secs, 3600);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "rate_limit": {"backend": "redis", "failure_policy": "open"},
                "usage": {"backend": "postgres"},
                "auth": {"jwt_secret": "s3cret", "user_tier": "premium"},
                "observability": {"tracing": {"enabled": true, "sampling_ratio": 0.25}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.backend, CounterBackend::Redis);
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Open);
        assert_eq!(config.rate_limit.key_prefix, "ratelimit");
        assert_eq!(config.auth.user_tier, ApiKeyTier::Premium);
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert!(config.observability.tracing.enabled);
        assert_eq!(config.observability.tracing.sampling_ratio, 0.25);
        assert_eq!(config.observability.tracing.otlp_endpoint, "http://localhost:4317");
        assert!(config.needs_postgres());
    }
}
