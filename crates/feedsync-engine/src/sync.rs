//! Drains one store's pending ids through the feed builder and the marketplace.

use std::collections::BTreeSet;

use feedsync_client::MarketplaceApi;
use feedsync_core::{FeedRecord, ItemId, RegisteredStore};
use serde::Serialize;

use crate::feed::FeedBuilder;

pub const MIN_BULK_SIZE: usize = 5;
pub const MAX_BULK_SIZE: usize = 100;

/// Records per request for a pass over `id_count` ids: a fifth of the ids,
/// kept within [`MIN_BULK_SIZE`, `MAX_BULK_SIZE`].
#[must_use]
pub fn bulk_size(id_count: usize) -> usize {
    id_count.div_ceil(5).clamp(MIN_BULK_SIZE, MAX_BULK_SIZE)
}

/// What a batch sync did for one store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Ids that remain pending.
    pub residual: BTreeSet<ItemId>,
    /// Records the marketplace accepted.
    pub sent: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Ids whose records lack an image or a price.
    pub invalid: Vec<ItemId>,
    /// Ids removed because the catalog cannot produce a record for them.
    pub dropped: Vec<ItemId>,
}

/// Sends every valid record for `ids` in batches of [`bulk_size`] and returns
/// the ids that are still pending.
///
/// An id leaves the pending set only when the batch carrying it is accepted
/// or when the catalog can never produce a record for it. Invalid records are
/// never transmitted and stay pending. A rejected or failed batch keeps all
/// of its ids.
pub async fn sync_products(
    builder: &FeedBuilder,
    api: &dyn MarketplaceApi,
    store: &RegisteredStore,
    ids: &[ItemId],
) -> SyncOutcome {
    let size = bulk_size(ids.len());
    let built = builder.build_records(&store.config, ids).await;

    let mut outcome = SyncOutcome {
        residual: built.working,
        dropped: built.dropped,
        ..SyncOutcome::default()
    };

    let mut valid: Vec<FeedRecord> = Vec::with_capacity(built.records.len());
    for (id, record) in built.records {
        if record.is_valid() {
            valid.push(record);
        } else {
            tracing::debug!(store = %store.code(), item = id, "record missing image or price");
            outcome.invalid.push(id);
        }
    }
    if !outcome.invalid.is_empty() {
        tracing::info!(
            store = %store.code(),
            count = outcome.invalid.len(),
            "skipping invalid records"
        );
    }

    for batch in valid.chunks(size) {
        outcome.batches += 1;
        match api.update_products(store, batch).await {
            Ok(()) => {
                for record in batch {
                    if let Ok(id) = record.id.parse::<ItemId>() {
                        outcome.residual.remove(&id);
                    }
                }
                outcome.sent += batch.len();
                tracing::debug!(store = %store.code(), count = batch.len(), "batch accepted");
            }
            Err(e) => {
                outcome.failed_batches += 1;
                tracing::warn!(
                    store = %store.code(),
                    count = batch.len(),
                    error = %e,
                    "product batch failed, ids stay pending"
                );
            }
        }
    }

    tracing::info!(
        store = %store.code(),
        requested = ids.len(),
        sent = outcome.sent,
        batches = outcome.batches,
        failed_batches = outcome.failed_batches,
        pending = outcome.residual.len(),
        "store sync finished"
    );
    outcome
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;
