//! Glyco Gateway
//!
//! Authentication and rate-limiting gateway in front of the diabetes
//! self-management API:
//! - API keys (`X-Api-Key`) and bearer tokens (`Authorization: Bearer`)
//! - Role-derived permission sets
//! - Hourly quota windows per identity and endpoint (memory, Redis, PostgreSQL)
//! - Asynchronous usage audit log

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use api::{create_router, AppState};
pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::RngCore;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use config::{CounterBackend, StorageBackend, UsageBackend};
use domain::api_key::ApiKeyRepository;
use domain::auth::RoleStore;
use domain::rate_limit::RateLimitStore;
use domain::usage::UsageSink;
use infrastructure::{
    api_key::{ApiKeyService, InMemoryApiKeyRepository, PostgresApiKeyRepository},
    auth::{
        CredentialAuthenticator, InMemoryRoleStore, JwtConfig, JwtService, PostgresRoleStore,
        TierDefaults,
    },
    rate_limit::{InMemoryRateLimitStore, PostgresRateLimitStore, RateLimiter, RedisRateLimitStore},
    storage::{connect_pool, run_storage_migrations, PostgresConfig},
    usage::{InMemoryUsageSink, PostgresUsageSink, TracingUsageSink, UsageRecorder},
};

/// Build every service from configuration
///
/// Opens the PostgreSQL pool (and applies the schema) only when some
/// component is configured to use it. Spawns the usage worker and the
/// counter pruner. The returned handle completes once every clone of the
/// state has been dropped and the queued usage entries are written.
pub async fn create_app_state(
    config: &AppConfig,
) -> anyhow::Result<(AppState, JoinHandle<()>)> {
    let pool = if config.needs_postgres() {
        let pool = open_pool(config).await?;
        let applied = run_storage_migrations(&pool).await?;
        info!(applied, "Storage schema up to date");
        Some(pool)
    } else {
        None
    };

    info!(backend = ?config.storage.backend, "Key and role storage");
    let (repository, roles): (Arc<dyn ApiKeyRepository>, Arc<dyn RoleStore>) =
        match (config.storage.backend, &pool) {
            (StorageBackend::Postgres, Some(pool)) => (
                Arc::new(PostgresApiKeyRepository::new(pool.clone())),
                Arc::new(PostgresRoleStore::new(pool.clone())),
            ),
            _ => (
                Arc::new(InMemoryApiKeyRepository::new()),
                Arc::new(InMemoryRoleStore::new()),
            ),
        };

    let api_keys = Arc::new(ApiKeyService::new(repository));
    let jwt = create_jwt_service(config);

    let authenticator = Arc::new(
        CredentialAuthenticator::new(api_keys.clone(), Arc::new(jwt), roles).with_tiers(
            TierDefaults {
                anonymous: config.auth.anonymous_tier,
                user: config.auth.user_tier,
            },
        ),
    );

    let store = create_counter_store(config, pool.as_ref()).await?;
    let rate_limiter = Arc::new(
        RateLimiter::new(store)
            .with_window(Duration::from_secs(config.rate_limit.window_secs.max(1)))
            .with_failure_policy(config.rate_limit.failure_policy),
    );
    info!(
        backend = rate_limiter.backend(),
        window_secs = config.rate_limit.window_secs,
        failure_policy = %rate_limiter.failure_policy(),
        "Rate limiter ready"
    );

    rate_limiter
        .clone()
        .spawn_pruner(Duration::from_secs(config.rate_limit.prune_interval_secs.max(1)));

    let sink: Arc<dyn UsageSink> = match (config.usage.backend, &pool) {
        (UsageBackend::Postgres, Some(pool)) => Arc::new(PostgresUsageSink::new(pool.clone())),
        (UsageBackend::Memory, _) => Arc::new(InMemoryUsageSink::new()),
        _ => Arc::new(TracingUsageSink),
    };
    let (usage, usage_worker) = UsageRecorder::spawn(sink, config.usage.channel_capacity.max(1));

    if config.server.trust_proxy {
        info!("Client addresses taken from forwarding headers");
    }

    let state = AppState::new(api_keys, authenticator, rate_limiter, usage)
        .with_trust_proxy(config.server.trust_proxy);

    Ok((state, usage_worker))
}

/// Open the shared pool from `storage.database_url`
pub async fn open_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let url = config
        .storage
        .database_url
        .clone()
        .context("storage.database_url is required for PostgreSQL backends")?;

    info!("Connecting to PostgreSQL...");
    let pool = connect_pool(
        &PostgresConfig::new(url).with_max_connections(config.storage.max_connections),
    )
    .await?;

    Ok(pool)
}

/// Token service for `auth.jwt_secret`
///
/// Without a configured secret every bearer token is rejected: the service
/// signs with a random per-process secret nobody else knows.
pub fn create_jwt_service(config: &AppConfig) -> JwtService {
    let secret = match &config.auth.jwt_secret {
        Some(secret) if !secret.is_empty() => secret.clone(),
        _ => {
            warn!("auth.jwt_secret is not set; bearer tokens will be rejected");
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        }
    };

    let mut jwt_config = JwtConfig::new(secret, config.auth.token_expiration_hours);
    if let Some(audience) = &config.auth.jwt_audience {
        jwt_config = jwt_config.with_audience(audience.clone());
    }

    JwtService::new(jwt_config)
}

async fn create_counter_store(
    config: &AppConfig,
    pool: Option<&PgPool>,
) -> anyhow::Result<Arc<dyn RateLimitStore>> {
    let store: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
        CounterBackend::Memory => Arc::new(InMemoryRateLimitStore::new()),
        CounterBackend::Redis => Arc::new(
            RedisRateLimitStore::connect(&config.rate_limit.redis_url, &config.rate_limit.key_prefix)
                .await?,
        ),
        CounterBackend::Postgres => {
            let pool = pool.context("PostgreSQL counter store requires a database pool")?;
            Arc::new(PostgresRateLimitStore::new(pool.clone()))
        }
    };

    Ok(store)
}
