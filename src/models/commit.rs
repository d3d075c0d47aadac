//! Commit entity model
//!
//! Commits ingested from GitHub. Rows are written once and never mutated;
//! `(commit_hash, repository_id)` is unique.

use super::tracked_repository::Entity as TrackedRepository;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "commits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning tracked repository
    pub repository_id: Uuid,

    /// Commit SHA assigned by GitHub
    pub commit_hash: String,

    pub message: String,

    pub author_name: String,

    pub author_email: String,

    /// Author date of the commit
    pub committed_at: DateTimeWithTimeZone,

    /// Browser URL of the commit
    pub url: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tracked_repository::Entity",
        from = "Column::RepositoryId",
        to = "super::tracked_repository::Column::Id"
    )]
    TrackedRepository,
}

impl Related<TrackedRepository> for Entity {
    fn to() -> RelationDef {
        Relation::TrackedRepository.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
