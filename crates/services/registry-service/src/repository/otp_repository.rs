//! Verification code slot repository.
//!
//! One row per email. Writes after the initial `put` are conditional on the
//! challenge id, so an update aimed at a challenge that a newer issue has
//! replaced matches nothing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use super::entities::otp_challenge::{self, ActiveModel, Entity as OtpEntity};
use common::AppResult;
use domain::OtpChallenge;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Current challenge for an email, in whatever state it is
    async fn find(&self, email: &str) -> AppResult<Option<OtpChallenge>>;

    /// Store a challenge, replacing the email's previous one
    async fn put(&self, challenge: OtpChallenge) -> AppResult<()>;

    /// Count a wrong guess against an unconsumed challenge.
    ///
    /// Returns the new attempt count, or `None` if the challenge is gone.
    async fn record_failed_attempt(&self, id: Uuid) -> AppResult<Option<u32>>;

    /// Consume a challenge still below the attempt ceiling.
    ///
    /// Returns `false` when the challenge was replaced, consumed or exhausted
    /// in the meantime.
    async fn consume(&self, id: Uuid, max_attempts: u32, at: DateTime<Utc>) -> AppResult<bool>;
}

/// SeaORM-backed code slot repository
pub struct OtpStore {
    db: Arc<DatabaseConnection>,
}

impl OtpStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OtpRepository for OtpStore {
    async fn find(&self, email: &str) -> AppResult<Option<OtpChallenge>> {
        Ok(OtpEntity::find_by_id(email.to_string())
            .one(self.db.as_ref())
            .await?
            .map(OtpChallenge::from))
    }

    async fn put(&self, challenge: OtpChallenge) -> AppResult<()> {
        let active_model = ActiveModel {
            email: Set(challenge.email),
            id: Set(challenge.id),
            code_hash: Set(challenge.code_hash),
            issued_at: Set(challenge.issued_at),
            expires_at: Set(challenge.expires_at),
            attempt_count: Set(challenge.attempt_count as i32),
            consumed_at: Set(challenge.consumed_at),
        };

        // Last writer wins
        OtpEntity::insert(active_model)
            .on_conflict(
                OnConflict::column(otp_challenge::Column::Email)
                    .update_columns([
                        otp_challenge::Column::Id,
                        otp_challenge::Column::CodeHash,
                        otp_challenge::Column::IssuedAt,
                        otp_challenge::Column::ExpiresAt,
                        otp_challenge::Column::AttemptCount,
                        otp_challenge::Column::ConsumedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn record_failed_attempt(&self, id: Uuid) -> AppResult<Option<u32>> {
        let result = OtpEntity::update_many()
            .col_expr(
                otp_challenge::Column::AttemptCount,
                Expr::col(otp_challenge::Column::AttemptCount).add(1),
            )
            .filter(otp_challenge::Column::Id.eq(id))
            .filter(otp_challenge::Column::ConsumedAt.is_null())
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        Ok(OtpEntity::find()
            .filter(otp_challenge::Column::Id.eq(id))
            .one(self.db.as_ref())
            .await?
            .map(|model| model.attempt_count.max(0) as u32))
    }

    async fn consume(&self, id: Uuid, max_attempts: u32, at: DateTime<Utc>) -> AppResult<bool> {
        let result = OtpEntity::update_many()
            .col_expr(otp_challenge::Column::ConsumedAt, Expr::value(Some(at)))
            .filter(otp_challenge::Column::Id.eq(id))
            .filter(otp_challenge::Column::ConsumedAt.is_null())
            .filter(otp_challenge::Column::AttemptCount.lt(max_attempts as i32))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn row(id: Uuid, attempts: i32) -> otp_challenge::Model {
        let now = Utc::now();
        otp_challenge::Model {
            email: "a@x.com".into(),
            id,
            code_hash: "hash".into(),
            issued_at: now,
            expires_at: now + Duration::minutes(10),
            attempt_count: attempts,
            consumed_at: None,
        }
    }

    #[tokio::test]
    async fn failed_attempt_returns_the_new_count() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1)])
            .append_query_results([vec![row(id, 3)]])
            .into_connection();

        let count = OtpStore::new(Arc::new(db)).record_failed_attempt(id).await.unwrap();
        assert_eq!(count, Some(3));
    }

    #[tokio::test]
    async fn failed_attempt_on_replaced_challenge_is_a_no_op() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(0)])
            .into_connection();

        let count = OtpStore::new(Arc::new(db))
            .record_failed_attempt(Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(count, None);
    }

    #[tokio::test]
    async fn consume_succeeds_only_once() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1), exec(0)])
            .into_connection();
        let store = OtpStore::new(Arc::new(db));

        assert!(store.consume(id, 5, Utc::now()).await.unwrap());
        assert!(!store.consume(id, 5, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn find_maps_attempt_count() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(id, 2)]])
            .into_connection();

        let challenge = OtpStore::new(Arc::new(db)).find("a@x.com").await.unwrap().unwrap();
        assert_eq!(challenge.id, id);
        assert_eq!(challenge.attempt_count, 2);
    }
}
