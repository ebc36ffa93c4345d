//! Catalog mutation webhooks.
//!
//! Handlers answer `202 Accepted` once the notification is queued. Marketplace
//! and per-store failures are logged by the engine and only show up in the
//! `skipped` list of the response.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use feedsync_core::ItemId;
use feedsync_engine::{DeletedItem, DeletedKind, NotifyReport};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

type Accepted<T> = (StatusCode, Json<ApiResponse<T>>);

#[derive(Debug, Deserialize)]
pub(super) struct SavedEvent {
    #[serde(default)]
    pub website_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeletedEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub website_ids: Vec<i64>,
    #[serde(default)]
    pub child_ids: Vec<ItemId>,
}

impl DeletedEvent {
    fn into_item(self, id: ItemId) -> DeletedItem {
        DeletedItem {
            id,
            kind: DeletedKind::from_type_code(&self.kind, self.child_ids),
            website_ids: self.website_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AttributesEvent {
    pub ids: Vec<ItemId>,
}

#[derive(Debug, Serialize)]
pub(super) struct PassScheduled {
    status: &'static str,
}

fn accepted<T: Serialize>(req_id: RequestId, data: T) -> Accepted<T> {
    (
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data,
            meta: ResponseMeta::new(req_id.0),
        }),
    )
}

pub(super) async fn product_saved(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<ItemId>,
    Json(event): Json<SavedEvent>,
) -> Accepted<NotifyReport> {
    let report = state
        .service
        .on_product_updated(id, &event.website_ids)
        .await;
    tracing::info!(item = id, stores = report.stores.len(), "product saved event handled");
    accepted(req_id, report)
}

pub(super) async fn product_deleted(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<ItemId>,
    Json(event): Json<DeletedEvent>,
) -> Accepted<NotifyReport> {
    let item = event.into_item(id);
    let report = state.service.on_product_deleted(&item).await;
    tracing::info!(item = id, stores = report.stores.len(), "product deleted event handled");
    accepted(req_id, report)
}

pub(super) async fn product_attributes_updated(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(event): Json<AttributesEvent>,
) -> Accepted<NotifyReport> {
    let report = state.service.on_product_attributes_updated(&event.ids).await;
    tracing::info!(
        count = event.ids.len(),
        stores = report.stores.len(),
        "attribute update event handled"
    );
    accepted(req_id, report)
}

/// Starts a reconciliation pass in the background.
pub(super) async fn config_changed(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Accepted<PassScheduled> {
    let service = Arc::clone(&state.service);
    tokio::spawn(async move {
        match service.on_config_changed().await {
            Ok(report) => tracing::info!(
                registered = report.registered.len(),
                unregistered = report.unregistered.len(),
                synced = report.synced.len(),
                "config change pass complete"
            ),
            Err(e) => tracing::warn!(error = %e, "config change pass failed"),
        }
    });
    accepted(req_id, PassScheduled { status: "scheduled" })
}
