mod events;
mod stores;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use feedsync_engine::FeedService;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware::{request_id, require_bearer_auth, AuthState, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeedService>,
    /// `None` when registry and queues live in memory.
    pub pool: Option<PgPool>,
}

/// Success envelope: `{"data": ..., "meta": {...}}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Unavailable,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error envelope: `{"error": {"code", "message"}, "meta": {...}}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(request_id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.error.code.status(), Json(self)).into_response()
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum StateBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Serialize)]
struct HealthData {
    status: &'static str,
    state_backend: StateBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    database_latency_ms: Option<u128>,
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/events/products/attributes",
            post(events::product_attributes_updated),
        )
        .route(
            "/api/v1/events/products/{id}/saved",
            post(events::product_saved),
        )
        .route(
            "/api/v1/events/products/{id}/deleted",
            post(events::product_deleted),
        )
        .route("/api/v1/events/config", post(events::config_changed))
        .route("/api/v1/stores", get(stores::list_stores))
        .route_layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/api/v1/health", get(health))
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

/// Public liveness probe. Degrades to 503 when Postgres stops answering.
async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> (StatusCode, Json<ApiResponse<HealthData>>) {
    let (status, data) = match &state.pool {
        None => (
            StatusCode::OK,
            HealthData {
                status: "ok",
                state_backend: StateBackend::Memory,
                database_latency_ms: None,
            },
        ),
        Some(pool) => match feedsync_db::ping(pool).await {
            Ok(latency) => (
                StatusCode::OK,
                HealthData {
                    status: "ok",
                    state_backend: StateBackend::Postgres,
                    database_latency_ms: Some(latency.as_millis()),
                },
            ),
            Err(e) => {
                tracing::warn!(error = %e, "health check: state store unreachable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    HealthData {
                        status: "degraded",
                        state_backend: StateBackend::Postgres,
                        database_latency_ms: None,
                    },
                )
            }
        },
    };

    (
        status,
        Json(ApiResponse {
            data,
            meta: ResponseMeta::new(req_id.0),
        }),
    )
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
