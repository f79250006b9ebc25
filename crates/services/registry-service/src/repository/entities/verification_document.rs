//! Document entry entity.

use sea_orm::entity::prelude::*;

use domain::{DomainError, VerificationDocument};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "verification_documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub case_id: Uuid,
    pub position: i32,
    pub document_type: String,
    pub storage_ref: String,
    pub file_name: String,
    pub content_type: String,
    pub uploaded_at: DateTimeUtc,
    pub review_status: String,
    pub reviewer_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for VerificationDocument {
    type Error = DomainError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(VerificationDocument {
            id: model.id,
            case_id: model.case_id,
            position: model.position,
            document_type: model.document_type.parse()?,
            storage_ref: model.storage_ref,
            file_name: model.file_name,
            content_type: model.content_type,
            uploaded_at: model.uploaded_at,
            review_status: model.review_status.parse()?,
            reviewer_note: model.reviewer_note,
            reviewed_by: model.reviewed_by,
            reviewed_at: model.reviewed_at,
        })
    }
}
