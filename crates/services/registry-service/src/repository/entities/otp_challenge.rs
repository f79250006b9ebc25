//! Verification code slot entity.

use sea_orm::entity::prelude::*;

use domain::OtpChallenge;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "otp_challenges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub email: String,
    /// Issuance id; conditional updates match on it
    pub id: Uuid,
    pub code_hash: String,
    pub issued_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
    pub attempt_count: i32,
    pub consumed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for OtpChallenge {
    fn from(model: Model) -> Self {
        OtpChallenge {
            id: model.id,
            email: model.email,
            code_hash: model.code_hash,
            issued_at: model.issued_at,
            expires_at: model.expires_at,
            attempt_count: model.attempt_count.max(0) as u32,
            consumed_at: model.consumed_at,
        }
    }
}
