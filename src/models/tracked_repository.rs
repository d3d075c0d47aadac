//! Tracked repository entity model
//!
//! A row per GitHub repository the service has been asked to watch. Metadata
//! columns stay empty until the first sync; `commit_last_pulled_at` is the
//! high-water mark used as the `since` filter for incremental syncs.

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Store-assigned identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Canonical `owner/name`, lowercase, unique
    #[sea_orm(unique)]
    pub repository_name: String,

    pub description: Option<String>,

    /// Browser URL of the repository
    pub url: Option<String>,

    /// Primary language as reported by GitHub
    pub language: Option<String>,

    pub forks_count: i32,

    pub stars_count: i32,

    pub open_issues_count: i32,

    pub watchers_count: i32,

    /// Authored-at timestamp of the last commit batch persisted
    pub commit_last_pulled_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// High-water mark in UTC, if any commits have been ingested.
    pub fn high_water_mark(&self) -> Option<DateTime<Utc>> {
        self.commit_last_pulled_at
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::commit::Entity")]
    Commits,
}

impl Related<super::commit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
