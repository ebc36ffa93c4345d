//! Catalog feed synchronization: store topology, feed records, pending-update
//! queues and the orchestrator that drives them.

pub mod catalog;
pub mod error;
pub mod fallback;
pub mod feed;
pub mod memory;
pub mod queue;
pub mod service;
pub mod snapshot;
pub mod sync;
pub mod topology;

pub use catalog::{Catalog, CatalogItem, CustomOption, ItemKind, ItemText, OptionKind};
pub use error::{CatalogError, SnapshotError, SyncError, TopologyError};
pub use feed::{BuildOutcome, FeedBuilder};
pub use memory::{InMemoryLocks, InMemoryStateStore};
pub use queue::{Registry, UpdateQueue};
pub use service::{
    DeletedItem, DeletedKind, FeedService, NotifyReport, PassReport, ServiceSettings,
    StoreStatus, StoreSyncReport,
};
pub use snapshot::CatalogSnapshot;
pub use sync::{bulk_size, sync_products, SyncOutcome};
pub use topology::{configured_stores, StoreView, TopologySource, Website};
