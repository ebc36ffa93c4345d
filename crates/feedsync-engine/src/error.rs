use std::path::PathBuf;

use feedsync_core::{ItemId, LockError, StateError};
use thiserror::Error;

/// Failures reading the merchant catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown catalog store {0}")]
    UnknownStore(i64),

    #[error("unknown category {0}")]
    UnknownCategory(i64),

    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("no exchange rate from {from} to {to}")]
    MissingExchangeRate { from: String, to: String },

    #[error("catalog backend error: {0}")]
    Backend(String),
}

/// Failures enumerating websites and store views.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("store group {0} referenced by a store view does not exist")]
    UnknownGroup(i64),

    #[error("topology backend error: {0}")]
    Backend(String),
}

/// Failures loading a catalog snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read catalog snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog snapshot: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid catalog snapshot: {0}")]
    Invalid(String),
}

/// Failures that abort a whole operation. Per-store and per-batch problems
/// are absorbed and reported instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
