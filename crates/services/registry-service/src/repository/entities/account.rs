//! Account database entity for SeaORM.

use sea_orm::entity::prelude::*;

use domain::{Account, DomainError};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub role: String,
    pub email_verified: bool,
    pub account_status: String,
    pub credential_kind: String,
    pub external_identity_ref: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Convert database model to domain entity
impl TryFrom<Model> for Account {
    type Error = DomainError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Account {
            id: model.id,
            email: model.email,
            role: model.role.parse()?,
            email_verified: model.email_verified,
            account_status: model.account_status.parse()?,
            credential_kind: model.credential_kind.parse()?,
            external_identity_ref: model.external_identity_ref,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
