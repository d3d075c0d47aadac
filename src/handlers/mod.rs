//! # API Handlers
//!
//! HTTP endpoint handlers for the repository stats read surface.

pub mod commits;
pub mod leaderboard;
pub mod types;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub use commits::list_commits;
pub use leaderboard::get_leaderboard;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness and database connectivity probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service and database are reachable"),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = ?err, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database service unavailable",
        )
    })?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Fallback for unknown routes
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": "The requested resource was not found"
        })),
    )
        .into_response()
}
