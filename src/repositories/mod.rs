//! # Repository Layer
//!
//! The [`RepoStore`] contract the watcher writes through and the read path
//! queries, with a SeaORM implementation ([`DbStore`]) and an in-process one
//! ([`memory::MemoryStore`]).

pub mod commit;
pub mod memory;
pub mod tracked_repository;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::connectors::{CommitRecord, RepositoryMetadata};
use crate::error::RepositoryError;
use crate::models::{commit as commit_model, tracked_repository as repo_model};

pub use commit::CommitRepository;
pub use memory::MemoryStore;
pub use tracked_repository::TrackedRepositoryRepository;

/// One row of the contributor leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    pub author_name: String,
    pub commit_count: i64,
}

/// Persistence contract for tracked repositories and their commits.
///
/// Each call is atomic on its own; there are no cross-call transactions.
#[async_trait]
pub trait RepoStore: Send + Sync {
    /// All tracked repositories. An empty set is reported as `NotFound`.
    async fn list_tracked(&self) -> Result<Vec<repo_model::Model>, RepositoryError>;

    async fn get_by_name(&self, name: &str) -> Result<repo_model::Model, RepositoryError>;

    /// Create a record with empty metadata. A duplicate name is `Conflict`.
    async fn create(&self, name: &str) -> Result<Uuid, RepositoryError>;

    /// Overwrite every metadata column; this is a replace, not a merge.
    async fn replace_metadata(
        &self,
        id: Uuid,
        metadata: &RepositoryMetadata,
    ) -> Result<(), RepositoryError>;

    async fn advance_high_water_mark(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Insert unless `(sha, repository_id)` already exists. Returns whether a row was written.
    async fn insert_commit_if_absent(
        &self,
        repository_id: Uuid,
        commit: &CommitRecord,
    ) -> Result<bool, RepositoryError>;

    /// Newest first; equal timestamps ordered by hash.
    async fn list_commits(
        &self,
        repository_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<commit_model::Model>, RepositoryError>;

    /// Authors by commit count descending; ties broken by author name ascending.
    async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, RepositoryError>;
}

/// [`RepoStore`] backed by the relational database.
#[derive(Debug, Clone)]
pub struct DbStore {
    repositories: TrackedRepositoryRepository,
    commits: CommitRepository,
}

impl DbStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repositories: TrackedRepositoryRepository::new(db.clone()),
            commits: CommitRepository::new(db),
        }
    }
}

#[async_trait]
impl RepoStore for DbStore {
    async fn list_tracked(&self) -> Result<Vec<repo_model::Model>, RepositoryError> {
        self.repositories.list_all().await
    }

    async fn get_by_name(&self, name: &str) -> Result<repo_model::Model, RepositoryError> {
        self.repositories.get_by_name(name).await
    }

    async fn create(&self, name: &str) -> Result<Uuid, RepositoryError> {
        self.repositories.create(name).await
    }

    async fn replace_metadata(
        &self,
        id: Uuid,
        metadata: &RepositoryMetadata,
    ) -> Result<(), RepositoryError> {
        self.repositories.replace_metadata(id, metadata).await
    }

    async fn advance_high_water_mark(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.repositories.set_high_water_mark(id, at).await
    }

    async fn insert_commit_if_absent(
        &self,
        repository_id: Uuid,
        commit: &CommitRecord,
    ) -> Result<bool, RepositoryError> {
        self.commits.insert_if_absent(repository_id, commit).await
    }

    async fn list_commits(
        &self,
        repository_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<commit_model::Model>, RepositoryError> {
        self.commits
            .list_for_repository(repository_id, limit, offset)
            .await
    }

    async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        self.commits.leaderboard(limit).await
    }
}
