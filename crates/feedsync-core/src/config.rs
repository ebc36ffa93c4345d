use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be exercised with a plain
/// `HashMap` lookup in tests.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::str::FromStr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    }

    let database_url = require("DATABASE_URL")?;
    let marketplace_url = require("FEEDSYNC_MARKETPLACE_URL")?;

    let env = parse_environment(&or_default("FEEDSYNC_ENV", "development"))?;
    let bind_addr: SocketAddr = parse_as(
        "FEEDSYNC_BIND_ADDR",
        &or_default("FEEDSYNC_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("FEEDSYNC_LOG_LEVEL", "info");

    let marketplace_api_version = or_default("FEEDSYNC_MARKETPLACE_API_VERSION", "v1");
    let plugin_platform = or_default("FEEDSYNC_PLUGIN_PLATFORM", "feedsync");
    let plugin_version = or_default("FEEDSYNC_PLUGIN_VERSION", env!("CARGO_PKG_VERSION"));

    let request_timeout_secs: u64 = parse_as(
        "FEEDSYNC_REQUEST_TIMEOUT_SECS",
        &or_default("FEEDSYNC_REQUEST_TIMEOUT_SECS", "120"),
    )?;
    let max_retries: u32 = parse_as(
        "FEEDSYNC_MAX_RETRIES",
        &or_default("FEEDSYNC_MAX_RETRIES", "2"),
    )?;
    let retry_backoff_base_ms: u64 = parse_as(
        "FEEDSYNC_RETRY_BACKOFF_BASE_MS",
        &or_default("FEEDSYNC_RETRY_BACKOFF_BASE_MS", "1000"),
    )?;
    let lock_wait_secs: u64 = parse_as(
        "FEEDSYNC_LOCK_WAIT_SECS",
        &or_default("FEEDSYNC_LOCK_WAIT_SECS", "10"),
    )?;
    let registration_backoff_secs: i64 = parse_as(
        "FEEDSYNC_REGISTRATION_BACKOFF_SECS",
        &or_default("FEEDSYNC_REGISTRATION_BACKOFF_SECS", "14400"),
    )?;
    if registration_backoff_secs < 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "FEEDSYNC_REGISTRATION_BACKOFF_SECS".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    let sync_schedule = or_default("FEEDSYNC_SYNC_SCHEDULE", "0 */5 * * * *");
    let catalog_path = PathBuf::from(or_default(
        "FEEDSYNC_CATALOG_PATH",
        "./config/catalog.yaml",
    ));

    let db_max_connections: u32 = parse_as(
        "FEEDSYNC_DB_MAX_CONNECTIONS",
        &or_default("FEEDSYNC_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "FEEDSYNC_DB_MIN_CONNECTIONS",
        &or_default("FEEDSYNC_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parse_as(
        "FEEDSYNC_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("FEEDSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        marketplace_url,
        marketplace_api_version,
        plugin_platform,
        plugin_version,
        request_timeout_secs,
        max_retries,
        retry_backoff_base_ms,
        lock_wait_secs,
        registration_backoff_secs,
        sync_schedule,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "FEEDSYNC_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
