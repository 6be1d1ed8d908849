//! Create-key command - issues a key without going through HTTP

use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;

use crate::config::StorageBackend;
use crate::domain::api_key::{ApiKeyTier, OwnerId};
use crate::infrastructure::api_key::{
    ApiKeyService, CreateApiKeyParams, PostgresApiKeyRepository,
};

#[derive(Args, Debug)]
pub struct CreateKeyArgs {
    /// Principal id of the key owner
    #[arg(long)]
    pub owner: String,

    /// Display name of the key
    #[arg(long)]
    pub name: String,

    /// free, basic or premium
    #[arg(long, default_value = "free")]
    pub tier: String,

    /// Days until the key expires
    #[arg(long)]
    pub expires_in_days: Option<i64>,

    /// Hourly quota overriding the tier default
    #[arg(long)]
    pub rate_limit: Option<u32>,
}

pub async fn run(args: CreateKeyArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;

    if config.storage.backend != StorageBackend::Postgres {
        anyhow::bail!("create-key needs storage.backend = \"postgres\"; in-memory keys vanish on exit");
    }

    let tier: ApiKeyTier = args.tier.parse()?;

    let mut params = CreateApiKeyParams::new(OwnerId::new(args.owner), args.name, tier);
    if let Some(days) = args.expires_in_days {
        params = params.with_expiration(Utc::now() + Duration::days(days));
    }
    if let Some(limit) = args.rate_limit {
        params = params.with_rate_limit_per_hour(limit);
    }

    let pool = crate::open_pool(&config).await?;
    let service = ApiKeyService::new(Arc::new(PostgresApiKeyRepository::new(pool)));
    let created = service.create_key_with(params).await?;

    println!("id:         {}", created.api_key.id());
    println!("prefix:     {}", created.api_key.key_prefix());
    println!("tier:       {}", created.api_key.tier());
    println!("rate limit: {}/hour", created.api_key.rate_limit_per_hour());
    println!();
    println!("{}", created.secret);
    println!();
    println!("Store this secret now; it cannot be shown again.");

    Ok(())
}
