//! # Commits API Handler

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::types::{CommitResponse, MessageResponse, parse_limit, parse_offset};
use crate::error::{ApiError, validation_error};
use crate::server::AppState;

/// Query parameters for commit listing
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct CommitsQuery {
    /// Repository as `owner/name`
    #[serde(rename = "repoName")]
    pub repo_name: Option<String>,
    /// Maximum number of commits to return (default: 5)
    pub limit: Option<String>,
    /// Number of commits to skip (default: 0)
    pub offset: Option<String>,
}

/// List commits of a repository, newest first. Unknown repositories start being tracked.
#[utoipa::path(
    get,
    path = "/v1/commits",
    params(CommitsQuery),
    responses(
        (status = 200, description = "Commits of the repository", body = [CommitResponse]),
        (status = 202, description = "Repository is now tracked; data pending", body = MessageResponse, example = json!({
            "message": "octo/cat is now being tracked. Please check back later"
        })),
        (status = 400, description = "Missing or malformed repository name", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "commits"
)]
pub async fn list_commits(
    State(state): State<AppState>,
    Query(query): Query<CommitsQuery>,
) -> Result<Response, ApiError> {
    let repo_name = query
        .repo_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            validation_error(
                "repoName query parameter is required",
                serde_json::json!({ "repoName": "missing" }),
            )
        })?;

    let limit = parse_limit(query.limit.as_deref());
    let offset = parse_offset(query.offset.as_deref());

    let commits = state
        .service
        .get_commits(repo_name, limit, offset)
        .await?;

    if commits.is_empty() {
        let body = MessageResponse {
            message: format!("{repo_name} is now being tracked. Please check back later"),
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let body: Vec<CommitResponse> = commits.into_iter().map(CommitResponse::from).collect();
    Ok(Json(body).into_response())
}
