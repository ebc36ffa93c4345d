//! The sync orchestrator: registration reconciliation, queue draining and
//! catalog event handling.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use feedsync_client::{unregister_confirmed, MarketplaceApi};
use feedsync_core::{
    AppConfig, AvailabilityRecord, ItemId, LockManager, RegisteredStore, StateError, StateStore,
    StoreConfig,
};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::error::SyncError;
use crate::feed::FeedBuilder;
use crate::queue::{Registry, UpdateQueue};
use crate::sync::{sync_products, SyncOutcome};
use crate::topology::{configured_stores, TopologySource};

/// Timing knobs of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Bounded wait for the registry and per-store locks.
    pub lock_wait: Duration,
    /// Minimum time between registration attempts of one store.
    pub registration_backoff_secs: i64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(10),
            registration_backoff_secs: 4 * 60 * 60,
        }
    }
}

impl ServiceSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            lock_wait: Duration::from_secs(config.lock_wait_secs),
            registration_backoff_secs: config.registration_backoff_secs,
        }
    }
}

/// Per-store result of draining the pending set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSyncReport {
    pub sent: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub invalid: usize,
    pub dropped: usize,
    /// Size of the pending set after the pass.
    pub pending: usize,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub registered: Vec<String>,
    pub registration_failed: Vec<String>,
    /// Not attempted: the last failure is inside the backoff window, or the
    /// failure marker could not be read.
    pub registration_deferred: Vec<String>,
    /// Unregistered because the configured key changed.
    pub rotated: Vec<String>,
    pub unregistered: Vec<String>,
    pub unregister_failed: Vec<String>,
    /// Registered stores that had missing topology attributes filled in.
    pub patched: Vec<String>,
    pub synced: BTreeMap<String, StoreSyncReport>,
    /// Stores whose pending set could not be read or written this pass.
    pub skipped: Vec<String>,
}

/// Stores touched by a catalog notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    pub stores: Vec<String>,
    /// Stores left untouched because their lock or state was unavailable.
    pub skipped: Vec<String>,
}

impl NotifyReport {
    fn merge(&mut self, other: NotifyReport) {
        self.stores.extend(other.stores);
        self.skipped.extend(other.skipped);
    }
}

/// Type of a deleted catalog item, as known at deletion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedKind {
    Simple,
    Configurable { children: Vec<ItemId> },
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedItem {
    pub id: ItemId,
    pub kind: DeletedKind,
    pub website_ids: Vec<i64>,
}

impl DeletedKind {
    /// Maps a catalog type code (`simple`, `configurable`, ...) to a kind.
    /// `children` only matters for configurable items.
    #[must_use]
    pub fn from_type_code(code: &str, children: Vec<ItemId>) -> Self {
        match code {
            "simple" => Self::Simple,
            "configurable" => Self::Configurable { children },
            other => Self::Other(other.to_string()),
        }
    }
}

impl DeletedItem {
    /// Availability updates that retire the item from the feed.
    #[must_use]
    pub fn availability_records(&self) -> Vec<AvailabilityRecord> {
        match &self.kind {
            DeletedKind::Simple => vec![AvailabilityRecord::unavailable(self.id)],
            DeletedKind::Configurable { children } => children
                .iter()
                .copied()
                .map(AvailabilityRecord::unavailable)
                .collect(),
            DeletedKind::Other(_) => Vec::new(),
        }
    }
}

/// Registration and pending-set state of one registered store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub code: String,
    pub website_id: Option<i64>,
    pub domain: String,
    pub currency: String,
    pub pending: usize,
    pub last_registration_failure: Option<i64>,
}

pub struct FeedService {
    catalog: Arc<dyn Catalog>,
    topology: Arc<dyn TopologySource>,
    api: Arc<dyn MarketplaceApi>,
    queue: UpdateQueue,
    builder: FeedBuilder,
}

impl FeedService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        topology: Arc<dyn TopologySource>,
        api: Arc<dyn MarketplaceApi>,
        state: Arc<dyn StateStore>,
        locks: Arc<dyn LockManager>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            builder: FeedBuilder::new(Arc::clone(&catalog)),
            catalog,
            topology,
            api,
            queue: UpdateQueue::new(
                state,
                locks,
                settings.lock_wait,
                settings.registration_backoff_secs,
            ),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    /// Runs a reconciliation pass at the current time.
    ///
    /// # Errors
    ///
    /// See [`FeedService::on_service_requested_at`].
    pub async fn on_service_requested(&self) -> Result<PassReport, SyncError> {
        self.on_service_requested_at(chrono::Utc::now().timestamp())
            .await
    }

    /// Reconciles configured stores with registered ones, then drains every
    /// registered store's pending set.
    ///
    /// Registration changes settle before any product is sent. Failures of
    /// single stores or batches are logged and reported, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the registry lock cannot be taken in time,
    /// the topology cannot be read, or the registry cannot be read or saved.
    pub async fn on_service_requested_at(&self, now: i64) -> Result<PassReport, SyncError> {
        let _guard = self.queue.lock_registry().await?;
        let configured = configured_stores(self.topology.as_ref()).await?;
        let mut registered = self.queue.registered_stores().await?;
        let mut report = PassReport::default();

        tracing::info!(
            configured = configured.len(),
            registered = registered.len(),
            "reconciliation pass started"
        );

        for (code, config) in &configured {
            if let Some(current) = registered.get(code) {
                if current.config.key != config.key {
                    if self.unregister(current).await {
                        tracing::info!(store = %code, "secret key changed, store unregistered");
                        registered.remove(code);
                        report.rotated.push(code.clone());
                    } else {
                        report.unregister_failed.push(code.clone());
                    }
                }
            }

            match registered.get_mut(code) {
                Some(current) => {
                    if current.config.website_id.is_none() && config.website_id.is_some() {
                        current.config.website_id = config.website_id;
                        report.patched.push(code.clone());
                    }
                }
                None => {
                    match self.queue.needs_registration(code, now).await {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!(store = %code, "registration backoff in effect");
                            report.registration_deferred.push(code.clone());
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(store = %code, error = %e, "registration marker unreadable");
                            report.registration_deferred.push(code.clone());
                            continue;
                        }
                    }
                    match self.register(config, now).await {
                        Some(store) => {
                            registered.insert(code.clone(), store);
                            report.registered.push(code.clone());
                        }
                        None => report.registration_failed.push(code.clone()),
                    }
                }
            }
        }

        let removed: Vec<String> = registered
            .keys()
            .filter(|code| !configured.contains_key(*code))
            .cloned()
            .collect();
        for code in removed {
            let Some(store) = registered.get(&code) else {
                continue;
            };
            if self.unregister(store).await {
                registered.remove(&code);
                if let Err(e) = self.queue.clear_store(&code).await {
                    tracing::warn!(store = %code, error = %e, "failed to clear state of removed store");
                }
                tracing::info!(store = %code, "store no longer configured, unregistered");
                report.unregistered.push(code);
            } else {
                report.unregister_failed.push(code);
            }
        }

        self.seed_outstanding(&mut registered).await;
        self.queue.save_registered_stores(&registered).await?;
        self.sync_stores(&registered, &mut report).await;

        tracing::info!(
            registered = report.registered.len(),
            unregistered = report.unregistered.len() + report.rotated.len(),
            synced = report.synced.len(),
            "reconciliation pass finished"
        );
        Ok(report)
    }

    /// Registers a store; its catalog is queued later by
    /// [`FeedService::seed_outstanding`]. `None` means the marketplace
    /// refused and the failure marker was set when possible.
    async fn register(&self, config: &StoreConfig, now: i64) -> Option<RegisteredStore> {
        match self.api.register(config).await {
            Ok(token) => {
                tracing::info!(store = %config.code, "store registered");
                let mut store = RegisteredStore::new(config.clone(), token);
                store.initial_sync_pending = true;
                Some(store)
            }
            Err(e) => {
                tracing::warn!(store = %config.code, error = %e, "store registration failed");
                if let Err(e) = self.queue.note_registration_failed(&config.code, now).await {
                    tracing::warn!(store = %config.code, error = %e, "failed to record registration failure");
                }
                None
            }
        }
    }

    /// Queues the whole catalog of every store still owed its initial sync.
    /// A store keeps the flag until seeding succeeds, so a failure here is
    /// retried on the next pass.
    async fn seed_outstanding(&self, registered: &mut Registry) {
        for store in registered.values_mut().filter(|s| s.initial_sync_pending) {
            let code = store.config.code.clone();
            let ids = match self.catalog.item_ids(store.config.store_id).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(store = %code, error = %e, "failed to list catalog for initial sync");
                    continue;
                }
            };
            match self.queue.seed_pending(&code, &ids).await {
                Ok(()) => {
                    store.initial_sync_pending = false;
                    tracing::info!(store = %code, count = ids.len(), "initial sync queued");
                }
                Err(e) => {
                    tracing::warn!(store = %code, error = %e, "failed to queue initial sync");
                }
            }
        }
    }

    async fn unregister(&self, store: &RegisteredStore) -> bool {
        match self.api.unregister(store).await {
            Ok(response) if unregister_confirmed(response.as_ref()) => true,
            Ok(response) => {
                tracing::warn!(store = %store.code(), response = ?response, "unregister not confirmed");
                false
            }
            Err(e) => {
                tracing::warn!(store = %store.code(), error = %e, "unregister failed");
                false
            }
        }
    }

    async fn sync_stores(&self, registered: &Registry, report: &mut PassReport) {
        for (code, store) in registered {
            let snapshot = match self.queue.pending(code).await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(store = %code, error = %e, "failed to read pending items");
                    report.skipped.push(code.clone());
                    continue;
                }
            };
            if snapshot.is_empty() {
                continue;
            }

            let ids: Vec<ItemId> = snapshot.iter().copied().collect();
            let outcome = sync_products(&self.builder, self.api.as_ref(), store, &ids).await;
            match self
                .queue
                .merge_residual(code, &snapshot, &outcome.residual)
                .await
            {
                Ok(pending) => {
                    report
                        .synced
                        .insert(code.clone(), store_report(&outcome, pending.len()));
                }
                Err(e) => {
                    tracing::warn!(store = %code, error = %e, "failed to save pending items");
                    report.skipped.push(code.clone());
                }
            }
        }
    }

    /// Queues an updated item for every registered store on its websites.
    /// Variants are queued through their configurable parents.
    pub async fn on_product_updated(&self, id: ItemId, website_ids: &[i64]) -> NotifyReport {
        let ids = match self.catalog.parent_ids(id).await {
            Ok(parents) if !parents.is_empty() => parents,
            Ok(_) => vec![id],
            Err(e) => {
                tracing::warn!(item = id, error = %e, "failed to look up parents, queueing item itself");
                vec![id]
            }
        };

        let mut report = NotifyReport::default();
        for store in self.stores_serving(website_ids).await {
            match self.queue.add_pending(store.code(), &ids).await {
                Ok(changed) => {
                    tracing::debug!(store = %store.code(), item = id, changed, "item queued");
                    report.stores.push(store.code().to_string());
                }
                Err(e) => {
                    tracing::warn!(store = %store.code(), item = id, error = %e, "failed to queue item");
                    report.skipped.push(store.code().to_string());
                }
            }
        }
        report
    }

    /// Marks a deleted item unavailable and removes it from pending sets.
    /// The removal happens whether or not the marketplace call succeeded.
    pub async fn on_product_deleted(&self, item: &DeletedItem) -> NotifyReport {
        let records = item.availability_records();
        let mut report = NotifyReport::default();
        for store in self.stores_serving(&item.website_ids).await {
            if !records.is_empty() {
                if let Err(e) = self.api.send_availability(&store, &records).await {
                    tracing::warn!(store = %store.code(), item = item.id, error = %e, "availability update failed");
                }
            }
            match self.queue.remove_pending(store.code(), &[item.id]).await {
                Ok(_) => report.stores.push(store.code().to_string()),
                Err(e) => {
                    tracing::warn!(store = %store.code(), item = item.id, error = %e, "failed to dequeue deleted item");
                    report.skipped.push(store.code().to_string());
                }
            }
        }
        report
    }

    /// Queues each id on the stores of its websites. Ids the catalog cannot
    /// read are skipped.
    pub async fn on_product_attributes_updated(&self, ids: &[ItemId]) -> NotifyReport {
        let mut report = NotifyReport::default();
        for &id in ids {
            match self.catalog.website_ids(id).await {
                Ok(Some(website_ids)) => {
                    report.merge(self.on_product_updated(id, &website_ids).await);
                }
                Ok(None) => tracing::debug!(item = id, "item not in catalog, skipping"),
                Err(e) => tracing::warn!(item = id, error = %e, "failed to read item websites"),
            }
        }
        report.stores = report
            .stores
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        report
    }

    /// # Errors
    ///
    /// See [`FeedService::on_service_requested_at`].
    pub async fn on_config_changed(&self) -> Result<PassReport, SyncError> {
        self.on_service_requested().await
    }

    /// # Errors
    ///
    /// Returns [`StateError`] if the registry or a pending set cannot be read.
    pub async fn status(&self) -> Result<Vec<StoreStatus>, StateError> {
        let registered = self.queue.registered_stores().await?;
        let mut statuses = Vec::with_capacity(registered.len());
        for (code, store) in &registered {
            statuses.push(StoreStatus {
                code: code.clone(),
                website_id: store.config.website_id,
                domain: store.config.domain.clone(),
                currency: store.config.currency.code().to_string(),
                pending: self.queue.pending(code).await?.len(),
                last_registration_failure: self.queue.last_registration_failure(code).await?,
            });
        }
        Ok(statuses)
    }

    async fn stores_serving(&self, website_ids: &[i64]) -> Vec<RegisteredStore> {
        match self.queue.registered_stores().await {
            Ok(registered) => registered
                .into_values()
                .filter(|store| store.serves_website(website_ids))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read registered stores");
                Vec::new()
            }
        }
    }
}

fn store_report(outcome: &SyncOutcome, pending: usize) -> StoreSyncReport {
    StoreSyncReport {
        sent: outcome.sent,
        batches: outcome.batches,
        failed_batches: outcome.failed_batches,
        invalid: outcome.invalid.len(),
        dropped: outcome.dropped.len(),
        pending,
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;
