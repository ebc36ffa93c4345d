mod notify;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use feedsync_client::{ClientOptions, MarketplaceClient};
use feedsync_core::{AppConfig, LockManager, StateStore};
use feedsync_engine::{
    CatalogSnapshot, FeedService, InMemoryLocks, InMemoryStateStore, ServiceSettings,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::notify::{run_notify, NotifyCommands};

#[derive(Debug, Parser)]
#[command(name = "feedsync-cli")]
#[command(about = "Marketplace catalog feed sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one reconciliation pass and print its report
    Sync {
        /// Keep registry and queues in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Show registered stores and their pending counts
    Status,
    /// Replay a catalog notification
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("feedsync-cli: no command given, see --help");
        return Ok(());
    };

    let config = feedsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(?command, env = %config.env, "running command");

    match command {
        Commands::Sync { in_memory: true } => {
            let service = build_service(
                &config,
                Arc::new(InMemoryStateStore::new()),
                Arc::new(InMemoryLocks::new()),
            )?;
            print_json(&service.on_service_requested().await?)?;
        }
        Commands::Sync { in_memory: false } => {
            let service = postgres_service(&config).await?;
            print_json(&service.on_service_requested().await?)?;
        }
        Commands::Status => {
            let service = postgres_service(&config).await?;
            print_json(&service.status().await?)?;
        }
        Commands::Notify { command } => {
            let service = postgres_service(&config).await?;
            print_json(&run_notify(&service, command).await)?;
        }
        Commands::Db { command } => {
            let pool = connect(&config).await?;
            match command {
                DbCommands::Migrate => {
                    let applied = feedsync_db::run_migrations(&pool).await?;
                    if applied.is_empty() {
                        println!("database schema is up to date");
                    } else {
                        println!("applied migrations: {applied:?}");
                    }
                }
                DbCommands::Ping => {
                    let latency = feedsync_db::ping(&pool).await?;
                    println!("database ok ({} ms)", latency.as_millis());
                }
            }
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = feedsync_db::PoolConfig::from_app_config(config);
    Ok(feedsync_db::connect_pool(&config.database_url, pool_config).await?)
}

async fn postgres_service(config: &AppConfig) -> anyhow::Result<FeedService> {
    let pool = connect(config).await?;
    build_service(
        config,
        Arc::new(feedsync_db::PgStateStore::new(pool.clone())),
        Arc::new(feedsync_db::PgLockManager::new(pool)),
    )
}

fn build_service(
    config: &AppConfig,
    state: Arc<dyn StateStore>,
    locks: Arc<dyn LockManager>,
) -> anyhow::Result<FeedService> {
    let snapshot = Arc::new(CatalogSnapshot::load(&config.catalog_path)?);
    let client = MarketplaceClient::new(
        &config.marketplace_url,
        ClientOptions::from_app_config(config),
    )?;
    Ok(FeedService::new(
        snapshot.clone(),
        snapshot,
        Arc::new(client),
        state,
        locks,
        ServiceSettings::from_app_config(config),
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests;
