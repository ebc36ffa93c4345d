use std::net::SocketAddr;
use std::path::PathBuf;

/// Deployment stage from `FEEDSYNC_ENV`. Only development may run without
/// webhook keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub marketplace_url: String,
    pub marketplace_api_version: String,
    pub plugin_platform: String,
    pub plugin_version: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub lock_wait_secs: u64,
    pub registration_backoff_secs: i64,
    pub sync_schedule: String,
    pub catalog_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("marketplace_url", &self.marketplace_url)
            .field("marketplace_api_version", &self.marketplace_api_version)
            .field("plugin_platform", &self.plugin_platform)
            .field("plugin_version", &self.plugin_version)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("lock_wait_secs", &self.lock_wait_secs)
            .field("registration_backoff_secs", &self.registration_backoff_secs)
            .field("sync_schedule", &self.sync_schedule)
            .field("catalog_path", &self.catalog_path)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .finish()
    }
}
