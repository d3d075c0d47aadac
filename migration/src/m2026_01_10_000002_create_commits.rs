//! Migration to create the commits table.
//!
//! Commits are unique per `(commit_hash, repository_id)`; the ingestion path
//! relies on that index for `ON CONFLICT DO NOTHING` inserts.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Commits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Commits::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Commits::RepositoryId).uuid().not_null())
                    .col(ColumnDef::new(Commits::CommitHash).text().not_null())
                    .col(ColumnDef::new(Commits::Message).text().not_null())
                    .col(ColumnDef::new(Commits::AuthorName).text().not_null())
                    .col(ColumnDef::new(Commits::AuthorEmail).text().not_null())
                    .col(
                        ColumnDef::new(Commits::CommittedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Commits::Url).text().not_null())
                    .col(
                        ColumnDef::new(Commits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_commits_repository_id")
                            .from(Commits::Table, Commits::RepositoryId)
                            .to(Repositories::Table, Repositories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_commits_hash_repository")
                    .table(Commits::Table)
                    .col(Commits::CommitHash)
                    .col(Commits::RepositoryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Paginated listing reads newest-first per repository
        manager
            .create_index(
                Index::create()
                    .name("idx_commits_repository_committed_at")
                    .table(Commits::Table)
                    .col(Commits::RepositoryId)
                    .col(Commits::CommittedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_commits_repository_committed_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_commits_hash_repository").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Commits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Commits {
    Table,
    Id,
    RepositoryId,
    CommitHash,
    Message,
    AuthorName,
    AuthorEmail,
    CommittedAt,
    Url,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Repositories {
    Table,
    Id,
}
