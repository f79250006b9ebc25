//! Migration: at most one undecided case per account.
//!
//! Partial unique indexes are not expressible through the schema builder, so
//! this one is plain Postgres.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_employer_cases_one_open \
                 ON employer_cases (account_id) \
                 WHERE status IN ('none', 'pending')",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_employer_cases_one_open")
            .await?;
        Ok(())
    }
}
