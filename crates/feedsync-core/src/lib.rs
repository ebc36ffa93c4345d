pub mod app_config;
pub mod config;
pub mod feed;
pub mod locale;
pub mod state;
pub mod store;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use feed::{Attribute, AvailabilityRecord, CategoryPath, FeedRecord, LanguageBlock};
pub use locale::{Currency, Language};
pub use state::{
    LockError, LockGuard, LockManager, StateError, StateKey, StateStore, INSTALLED_STORES_KEY,
};
pub use store::{LanguageStores, RegisteredStore, StoreConfig};

/// Catalog item identifier as used by the merchant catalog.
pub type ItemId = i64;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("unknown language code: {0}")]
    UnknownLanguage(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
