//! Commit persistence
//!
//! Idempotent ingestion, per-repository listing and the author leaderboard.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::LeaderboardEntry;
use crate::connectors::CommitRecord;
use crate::error::RepositoryError;
use crate::models::commit::{self, Entity as Commit};
use crate::models::to_db_time;

/// Repository for commit rows
#[derive(Debug, Clone)]
pub struct CommitRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl CommitRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a commit unless the same hash is already stored for the repository
    ///
    /// # Returns
    ///
    /// `true` when a new row was written, `false` for a duplicate
    pub async fn insert_if_absent(
        &self,
        repository_id: Uuid,
        record: &CommitRecord,
    ) -> Result<bool, RepositoryError> {
        let model = commit::ActiveModel {
            id: Set(Uuid::new_v4()),
            repository_id: Set(repository_id),
            commit_hash: Set(record.sha.clone()),
            message: Set(record.message.clone()),
            author_name: Set(record.author_name.clone()),
            author_email: Set(record.author_email.clone()),
            committed_at: Set(to_db_time(record.authored_at)),
            url: Set(record.url.clone()),
            created_at: Set(to_db_time(Utc::now())),
        };

        let rows = Commit::insert(model)
            .on_conflict(
                OnConflict::columns([commit::Column::CommitHash, commit::Column::RepositoryId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        Ok(rows > 0)
    }

    /// Lists commits of one repository, newest first
    ///
    /// # Arguments
    ///
    /// * `repository_id` - Owning repository
    /// * `limit` - Maximum rows returned
    /// * `offset` - Rows skipped
    pub async fn list_for_repository(
        &self,
        repository_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<commit::Model>, RepositoryError> {
        let rows = Commit::find()
            .filter(commit::Column::RepositoryId.eq(repository_id))
            .order_by_desc(commit::Column::CommittedAt)
            .order_by_asc(commit::Column::CommitHash)
            .offset(offset)
            .limit(limit)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }

    /// Counts commits per author across all repositories
    pub async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>, RepositoryError> {
        let rows: Vec<(String, i64)> = Commit::find()
            .select_only()
            .column(commit::Column::AuthorName)
            .column_as(Expr::col(commit::Column::Id).count(), "commit_count")
            .group_by(commit::Column::AuthorName)
            .order_by(Expr::col(commit::Column::Id).count(), Order::Desc)
            .order_by_asc(commit::Column::AuthorName)
            .limit(limit)
            .into_tuple()
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(author_name, commit_count)| LeaderboardEntry {
                author_name,
                commit_count,
            })
            .collect())
    }
}
