//! Migration to create the repositories table.
//!
//! Each row is a tracked GitHub repository keyed by its lowercase `owner/name`,
//! carrying the last fetched metadata and the commit high-water mark.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repositories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repositories::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Repositories::RepositoryName)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Repositories::Description).text().null())
                    .col(ColumnDef::new(Repositories::Url).text().null())
                    .col(ColumnDef::new(Repositories::Language).text().null())
                    .col(
                        ColumnDef::new(Repositories::ForksCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Repositories::StarsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Repositories::OpenIssuesCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Repositories::WatchersCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Repositories::CommitLastPulledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Repositories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Repositories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repositories_repository_name")
                    .table(Repositories::Table)
                    .col(Repositories::RepositoryName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_repositories_repository_name")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Repositories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Repositories {
    Table,
    Id,
    RepositoryName,
    Description,
    Url,
    Language,
    ForksCount,
    StarsCount,
    OpenIssuesCount,
    WatchersCount,
    CommitLastPulledAt,
    CreatedAt,
    UpdatedAt,
}
