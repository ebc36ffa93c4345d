mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use feedsync_client::{ClientOptions, MarketplaceClient};
use feedsync_db::{PgLockManager, PgStateStore};
use feedsync_engine::{CatalogSnapshot, FeedService, ServiceSettings};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = feedsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = feedsync_db::PoolConfig::from_app_config(&config);
    let pool = feedsync_db::connect_pool(&config.database_url, pool_config).await?;
    feedsync_db::run_migrations(&pool).await?;

    let snapshot = Arc::new(CatalogSnapshot::load(&config.catalog_path)?);
    let client = MarketplaceClient::new(
        &config.marketplace_url,
        ClientOptions::from_app_config(&config),
    )?;
    let service = Arc::new(FeedService::new(
        snapshot.clone(),
        snapshot,
        Arc::new(client),
        Arc::new(PgStateStore::new(pool.clone())),
        Arc::new(PgLockManager::new(pool.clone())),
        ServiceSettings::from_app_config(&config),
    ));
    tracing::info!(
        env = %config.env,
        catalog = %config.catalog_path.display(),
        "feed service ready"
    );

    let _scheduler = scheduler::build_scheduler(Arc::clone(&service), &config.sync_schedule).await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        feedsync_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            service,
            pool: Some(pool),
        },
        auth,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
