//! # Leaderboard API Handler

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::types::{LeaderboardEntryResponse, MessageResponse, parse_limit};
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct LeaderboardQuery {
    /// Number of authors to return (default: 5)
    pub limit: Option<String>,
}

/// Top commit authors across all tracked repositories
#[utoipa::path(
    get,
    path = "/v1/leaderboard",
    params(LeaderboardQuery),
    responses(
        (status = 200, description = "Authors ordered by commit count", body = [LeaderboardEntryResponse]),
        (status = 202, description = "Nothing tracked yet", body = MessageResponse),
        (status = 500, description = "Internal server error", body = ApiError),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "leaderboard"
)]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Response, ApiError> {
    let limit = parse_limit(query.limit.as_deref());
    let entries = state.service.get_leaderboard(limit).await?;

    if entries.is_empty() {
        let body = MessageResponse {
            message: "no repositories are currently being tracked".to_string(),
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let body: Vec<LeaderboardEntryResponse> = entries
        .into_iter()
        .map(LeaderboardEntryResponse::from)
        .collect();
    Ok(Json(body).into_response())
}
