//! Migration: employer review cases and their document entries.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmployerCases::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmployerCases::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(EmployerCases::AccountId).uuid().not_null())
                    .col(ColumnDef::new(EmployerCases::Email).string().not_null())
                    .col(ColumnDef::new(EmployerCases::Status).string_len(16).not_null())
                    .col(ColumnDef::new(EmployerCases::DecidedBy).string().null())
                    .col(
                        ColumnDef::new(EmployerCases::DecidedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(EmployerCases::DecisionReason).text().null())
                    .col(
                        ColumnDef::new(EmployerCases::NotifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(EmployerCases::PreviousCaseId).uuid().null())
                    .col(
                        ColumnDef::new(EmployerCases::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmployerCases::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_employer_cases_account")
                            .from(EmployerCases::Table, EmployerCases::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_employer_cases_account_created")
                    .table(EmployerCases::Table)
                    .col(EmployerCases::AccountId)
                    .col(EmployerCases::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VerificationDocuments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VerificationDocuments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VerificationDocuments::CaseId).uuid().not_null())
                    .col(ColumnDef::new(VerificationDocuments::Position).integer().not_null())
                    .col(
                        ColumnDef::new(VerificationDocuments::DocumentType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(VerificationDocuments::StorageRef).string().not_null())
                    .col(ColumnDef::new(VerificationDocuments::FileName).string().not_null())
                    .col(ColumnDef::new(VerificationDocuments::ContentType).string().not_null())
                    .col(
                        ColumnDef::new(VerificationDocuments::UploadedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VerificationDocuments::ReviewStatus)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(VerificationDocuments::ReviewerNote).text().null())
                    .col(ColumnDef::new(VerificationDocuments::ReviewedBy).string().null())
                    .col(
                        ColumnDef::new(VerificationDocuments::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_verification_documents_case")
                            .from(VerificationDocuments::Table, VerificationDocuments::CaseId)
                            .to(EmployerCases::Table, EmployerCases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Entries are append-only; position orders them within a case
        manager
            .create_index(
                Index::create()
                    .name("idx_verification_documents_case_position")
                    .table(VerificationDocuments::Table)
                    .col(VerificationDocuments::CaseId)
                    .col(VerificationDocuments::Position)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VerificationDocuments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmployerCases::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
}

#[derive(Iden)]
enum EmployerCases {
    Table,
    Id,
    AccountId,
    Email,
    Status,
    DecidedBy,
    DecidedAt,
    DecisionReason,
    NotifiedAt,
    PreviousCaseId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum VerificationDocuments {
    Table,
    Id,
    CaseId,
    Position,
    DocumentType,
    StorageRef,
    FileName,
    ContentType,
    UploadedAt,
    ReviewStatus,
    ReviewerNote,
    ReviewedBy,
    ReviewedAt,
}
