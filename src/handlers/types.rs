//! # Common API Types
//!
//! Response payloads and query parsing shared by the read endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::commit;
use crate::repositories::LeaderboardEntry;

/// Default page size for list endpoints when `limit` is missing or unusable.
pub const DEFAULT_LIMIT: u64 = 5;

/// A stored commit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitResponse {
    /// Commit SHA
    pub commit_hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Author date
    pub date: DateTime<Utc>,
    /// Browser URL of the commit
    pub url: String,
}

impl From<commit::Model> for CommitResponse {
    fn from(model: commit::Model) -> Self {
        Self {
            commit_hash: model.commit_hash,
            message: model.message,
            author_name: model.author_name,
            author_email: model.author_email,
            date: model.committed_at.with_timezone(&Utc),
            url: model.url,
        }
    }
}

/// Commit count for one author
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntryResponse {
    pub author_name: String,
    pub commit_count: i64,
}

impl From<LeaderboardEntry> for LeaderboardEntryResponse {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            author_name: entry.author_name,
            commit_count: entry.commit_count,
        }
    }
}

/// Informational body returned with 202 Accepted
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Parses a positive `limit`, falling back to [`DEFAULT_LIMIT`].
pub fn parse_limit(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(DEFAULT_LIMIT)
}

/// Parses a non-negative `offset`, falling back to zero.
pub fn parse_offset(raw: Option<&str>) -> u64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 0)
        .map(|v| v as u64)
        .unwrap_or(0)
}
