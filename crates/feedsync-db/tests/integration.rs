//! Offline tests for feedsync-db configuration. No database required.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use feedsync_core::{AppConfig, Environment};
use feedsync_db::PoolConfig;

fn app_config(max: u32, min: u32) -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        marketplace_url: "https://marketplace.example".to_string(),
        marketplace_api_version: "v1".to_string(),
        plugin_platform: "feedsync".to_string(),
        plugin_version: "0.1.0".to_string(),
        request_timeout_secs: 120,
        max_retries: 2,
        retry_backoff_base_ms: 1000,
        lock_wait_secs: 10,
        registration_backoff_secs: 14_400,
        sync_schedule: "0 */5 * * * *".to_string(),
        catalog_path: PathBuf::from("./config/catalog.yaml"),
        db_max_connections: max,
        db_min_connections: min,
        db_acquire_timeout_secs: 9,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config(42, 7));
    assert_eq!(
        pool_config,
        PoolConfig {
            max_connections: 42,
            min_connections: 7,
            acquire_timeout: Duration::from_secs(9),
        }
    );
}

#[test]
fn min_connections_never_exceed_max() {
    let pool_config = PoolConfig::from_app_config(&app_config(4, 10));
    assert_eq!(pool_config.max_connections, 4);
    assert_eq!(pool_config.min_connections, 4);
}
