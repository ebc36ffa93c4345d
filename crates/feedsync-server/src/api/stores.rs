use axum::{extract::State, Extension, Json};
use feedsync_engine::StoreStatus;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState, ErrorCode, ResponseMeta};

/// Registered stores with their pending counts. Keys and tokens are never
/// part of [`StoreStatus`].
pub(super) async fn list_stores(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<StoreStatus>>>, ApiError> {
    let data = state.service.status().await.map_err(|e| {
        tracing::error!(error = %e, "failed to read store status");
        ApiError::new(req_id.0.clone(), ErrorCode::Unavailable, "store state unavailable")
    })?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
