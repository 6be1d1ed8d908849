//! Command line interface
//!
//! - `serve`: run the gateway (default)
//! - `migrate`: apply, inspect or roll back the PostgreSQL schema
//! - `create-key`: issue an API key from the shell
//! - `issue-token`: sign a development bearer token

pub mod keys;
pub mod migrate;
pub mod serve;
pub mod token;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Glyco Gateway - authentication and rate limiting for the diabetes API
#[derive(Parser)]
#[command(name = "glyco-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway HTTP server
    Serve,

    /// Apply pending schema migrations
    Migrate(migrate::MigrateArgs),

    /// Create an API key and print its secret once
    CreateKey(keys::CreateKeyArgs),

    /// Sign a bearer token with `auth.jwt_secret`
    IssueToken(token::IssueTokenArgs),
}

/// Configuration for the short-lived commands, with plain logging
pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init_logging(&config.logging);
    Ok(config)
}
