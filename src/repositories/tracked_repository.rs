//! Tracked repository persistence
//!
//! SeaORM operations for the `repositories` table.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::connectors::RepositoryMetadata;
use crate::error::RepositoryError;
use crate::models::to_db_time;
use crate::models::tracked_repository::{self, Entity as TrackedRepository};

const ENTITY: &str = "repository";

/// Repository for tracked repository rows
#[derive(Debug, Clone)]
pub struct TrackedRepositoryRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl TrackedRepositoryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists every tracked repository ordered by creation time
    ///
    /// # Returns
    ///
    /// The tracked repositories, or `RepositoryError::NotFound` when none exist
    pub async fn list_all(&self) -> Result<Vec<tracked_repository::Model>, RepositoryError> {
        let rows = TrackedRepository::find()
            .order_by_asc(tracked_repository::Column::CreatedAt)
            .order_by_asc(tracked_repository::Column::RepositoryName)
            .all(&*self.db)
            .await?;

        if rows.is_empty() {
            return Err(RepositoryError::not_found(ENTITY, "*"));
        }
        Ok(rows)
    }

    /// Finds a repository by its canonical name
    ///
    /// # Arguments
    ///
    /// * `name` - Normalized `owner/name`
    pub async fn get_by_name(
        &self,
        name: &str,
    ) -> Result<tracked_repository::Model, RepositoryError> {
        TrackedRepository::find()
            .filter(tracked_repository::Column::RepositoryName.eq(name))
            .one(&*self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found(ENTITY, name))
    }

    /// Inserts a new repository with empty metadata and no high-water mark
    pub async fn create(&self, name: &str) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        let model = tracked_repository::ActiveModel {
            id: Set(id),
            repository_name: Set(name.to_string()),
            description: Set(None),
            url: Set(None),
            language: Set(None),
            forks_count: Set(0),
            stars_count: Set(0),
            open_issues_count: Set(0),
            watchers_count: Set(0),
            commit_last_pulled_at: Set(None),
            created_at: Set(to_db_time(Utc::now())),
            updated_at: Set(None),
        };

        TrackedRepository::insert(model)
            .exec_without_returning(&*self.db)
            .await
            .map_err(|err| RepositoryError::from_write(ENTITY, name, err))?;
        Ok(id)
    }

    /// Overwrites all metadata columns of a repository
    pub async fn replace_metadata(
        &self,
        id: Uuid,
        metadata: &RepositoryMetadata,
    ) -> Result<(), RepositoryError> {
        let model = tracked_repository::ActiveModel {
            id: Set(id),
            description: Set(metadata.description.clone()),
            url: Set(metadata.html_url.clone()),
            language: Set(metadata.language.clone()),
            forks_count: Set(metadata.forks_count),
            stars_count: Set(metadata.stargazers_count),
            open_issues_count: Set(metadata.open_issues),
            watchers_count: Set(metadata.subscribers_count),
            updated_at: Set(Some(to_db_time(Utc::now()))),
            repository_name: NotSet,
            commit_last_pulled_at: NotSet,
            created_at: NotSet,
        };
        self.update(id, model).await
    }

    /// Sets the high-water mark; last writer wins
    pub async fn set_high_water_mark(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let model = tracked_repository::ActiveModel {
            id: Set(id),
            commit_last_pulled_at: Set(Some(to_db_time(at))),
            updated_at: Set(Some(to_db_time(Utc::now()))),
            ..Default::default()
        };
        self.update(id, model).await
    }

    async fn update(
        &self,
        id: Uuid,
        model: tracked_repository::ActiveModel,
    ) -> Result<(), RepositoryError> {
        match model.update(&*self.db).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) | Err(DbErr::RecordNotFound(_)) => {
                Err(RepositoryError::not_found(ENTITY, id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
