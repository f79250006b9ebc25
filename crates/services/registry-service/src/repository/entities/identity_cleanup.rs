//! Orphaned provider identity record.

use sea_orm::entity::prelude::*;

use domain::IdentityCleanup;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "identity_cleanups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub reason: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub resolved_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for IdentityCleanup {
    fn from(model: Model) -> Self {
        IdentityCleanup {
            id: model.id,
            external_id: model.external_id,
            email: model.email,
            reason: model.reason,
            attempts: model.attempts,
            last_error: model.last_error,
            created_at: model.created_at,
            resolved_at: model.resolved_at,
        }
    }
}
