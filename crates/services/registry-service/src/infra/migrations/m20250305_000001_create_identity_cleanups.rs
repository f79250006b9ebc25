//! Migration: provider identities awaiting deletion.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IdentityCleanups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdentityCleanups::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IdentityCleanups::ExternalId).string().not_null())
                    .col(ColumnDef::new(IdentityCleanups::Email).string().not_null())
                    .col(ColumnDef::new(IdentityCleanups::Reason).string().not_null())
                    .col(
                        ColumnDef::new(IdentityCleanups::Attempts)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(IdentityCleanups::LastError).text().null())
                    .col(
                        ColumnDef::new(IdentityCleanups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentityCleanups::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_identity_cleanups_resolved_at")
                    .table(IdentityCleanups::Table)
                    .col(IdentityCleanups::ResolvedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IdentityCleanups::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum IdentityCleanups {
    Table,
    Id,
    ExternalId,
    Email,
    Reason,
    Attempts,
    LastError,
    CreatedAt,
    ResolvedAt,
}
