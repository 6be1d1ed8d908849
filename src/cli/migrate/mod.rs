//! Migrate command - manages the PostgreSQL schema

use clap::Args;
use tracing::info;

use crate::infrastructure::storage::{
    migrations::storage_migrations, run_storage_migrations, PostgresMigrator,
};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Print applied and pending versions without changing anything
    #[arg(long, conflicts_with = "down")]
    pub status: bool,

    /// Revert the most recently applied migration
    #[arg(long)]
    pub down: bool,
}

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = super::load_config()?;
    let pool = crate::open_pool(&config).await?;
    let migrator = PostgresMigrator::new(pool.clone());

    if args.status {
        let applied = migrator.applied_versions().await?;

        for migration in storage_migrations() {
            let state = if applied.contains(&migration.version) {
                "applied"
            } else {
                "pending"
            };
            println!("{:>4}  {:<8} {}", migration.version, state, migration.description);
        }
        return Ok(());
    }

    if args.down {
        let Some(version) = migrator.current_version().await? else {
            println!("No migrations applied");
            return Ok(());
        };

        let migration = storage_migrations()
            .into_iter()
            .find(|m| m.version == version)
            .ok_or_else(|| anyhow::anyhow!("Unknown migration version {}", version))?;

        migrator.revert_migration(&migration).await?;
        info!(version, description = %migration.description, "Reverted migration");
        return Ok(());
    }

    let applied = run_storage_migrations(&pool).await?;
    info!(applied, "Migrations complete");

    Ok(())
}
