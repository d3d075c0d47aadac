//! Commit source trait definition
//!
//! Defines the interface the sync engine consumes to read repository metadata
//! and commit history from an external provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure from the external source.
///
/// Only `RateLimited` is recoverable; the sync engine retries it under backoff
/// and aborts the run on anything else.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by upstream (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("upstream returned status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Repository metadata as reported by the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub forks_count: i32,
    #[serde(default)]
    pub stargazers_count: i32,
    #[serde(default)]
    pub open_issues: i32,
    #[serde(default)]
    pub subscribers_count: i32,
}

/// One commit as observed on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub authored_at: DateTime<Utc>,
    pub url: String,
}

/// Read access to a provider's repositories.
///
/// Implementations must be safe for concurrent use by overlapping sync runs.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Fetch metadata for `owner/name`.
    async fn fetch_metadata(&self, repository: &str) -> Result<RepositoryMetadata, SourceError>;

    /// Fetch one page (1-based) of commits, newest first, optionally bounded by `since`.
    async fn fetch_commit_page(
        &self,
        repository: &str,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitRecord>, SourceError>;
}
