//! Account repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use uuid::Uuid;

use super::{corrupt_row, is_unique_violation};
use super::entities::account::{self, ActiveModel, Entity as AccountEntity};
use common::{AppError, AppResult};
use domain::{Account, AccountStatus, NewAccount};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Account persistence.
///
/// `insert` reports a unique-email violation as `AlreadyRegistered`; callers
/// that need the precise conflict re-read the winning row.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Account>>;

    /// Insert a new account row
    async fn insert(&self, account: NewAccount) -> AppResult<Account>;

    /// Set `email_verified`; `None` when no row matched
    async fn set_verified(&self, email: &str) -> AppResult<Option<Account>>;

    /// Move the employer review status from `from` to `to`.
    ///
    /// `None` when no row still holds `from`.
    async fn set_status(
        &self,
        email: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> AppResult<Option<Account>>;
}

/// SeaORM-backed account repository
pub struct AccountStore {
    db: Arc<DatabaseConnection>,
}

impl AccountStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn to_domain(model: account::Model) -> AppResult<Account> {
        Account::try_from(model).map_err(|e| corrupt_row("accounts", e))
    }
}

#[async_trait]
impl AccountRepository for AccountStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        AccountEntity::find()
            .filter(account::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?
            .map(Self::to_domain)
            .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Account>> {
        AccountEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(Self::to_domain)
            .transpose()
    }

    async fn insert(&self, account: NewAccount) -> AppResult<Account> {
        let now = Utc::now();
        let active_model = ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(account.email),
            role: Set(account.role.as_str().to_string()),
            email_verified: Set(account.email_verified),
            account_status: Set(AccountStatus::None.as_str().to_string()),
            credential_kind: Set(account.credential_kind.as_str().to_string()),
            external_identity_ref: Set(account.external_identity_ref),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match active_model.insert(self.db.as_ref()).await {
            Ok(model) => Self::to_domain(model),
            Err(e) if is_unique_violation(&e) => Err(AppError::AlreadyRegistered { verified: false }),
            Err(e) => Err(AppError::from(e)),
        }
    }

    async fn set_verified(&self, email: &str) -> AppResult<Option<Account>> {
        let result = AccountEntity::update_many()
            .col_expr(account::Column::EmailVerified, Expr::value(true))
            .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(account::Column::Email.eq(email))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_email(email).await
    }

    async fn set_status(
        &self,
        email: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> AppResult<Option<Account>> {
        let result = AccountEntity::update_many()
            .col_expr(account::Column::AccountStatus, Expr::value(to.as_str()))
            .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(account::Column::Email.eq(email))
            .filter(account::Column::AccountStatus.eq(from.as_str()))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_email(email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CredentialKind, Role};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn model(email: &str, role: &str, status: &str) -> account::Model {
        let now = Utc::now();
        account::Model {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: role.to_string(),
            email_verified: false,
            account_status: status.to_string(),
            credential_kind: "password".to_string(),
            external_identity_ref: Some("ext-1".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn find_by_email_maps_row_to_domain() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model("a@x.com", "employer", "pending")]])
            .into_connection();
        let store = AccountStore::new(Arc::new(db));

        let account = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(account.role, Role::Employer);
        assert_eq!(account.account_status, AccountStatus::Pending);
        assert_eq!(account.credential_kind, CredentialKind::Password);
        assert!(account.owns_identity("ext-1"));
    }

    #[tokio::test]
    async fn unknown_role_in_storage_is_an_internal_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model("a@x.com", "user", "none")]])
            .into_connection();
        let store = AccountStore::new(Arc::new(db));

        let err = store.find_by_email("a@x.com").await.unwrap_err();
        assert_eq!(err.code(), "internal-error");
    }

    #[tokio::test]
    async fn set_verified_reports_missing_rows() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let store = AccountStore::new(Arc::new(db));

        assert!(store.set_verified("ghost@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_returns_the_updated_row() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![model("e@x.com", "employer", "verified")]])
            .into_connection();
        let store = AccountStore::new(Arc::new(db));

        let account = store
            .set_status("e@x.com", AccountStatus::Pending, AccountStatus::Verified)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.account_status, AccountStatus::Verified);
    }

    #[tokio::test]
    async fn set_status_from_a_stale_status_changes_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let store = AccountStore::new(Arc::new(db));

        let updated = store
            .set_status("e@x.com", AccountStatus::Pending, AccountStatus::Rejected)
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
