//! Identity Registry - the authority on which email holds which role.
//!
//! Storage is the only side effect here; nothing in this module talks to the
//! identity provider or the notification transport.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{normalize_email, Account, AccountStatus, IdentityCleanup, NewAccount};

use crate::repository::{AccountRepository, CleanupRepository};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Identity Registry contract.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Account for an email, or `AccountNotFound`
    async fn lookup(&self, email: &str) -> AppResult<Account>;

    /// Account for an email, if any
    async fn find(&self, email: &str) -> AppResult<Option<Account>>;

    async fn get(&self, id: Uuid) -> AppResult<Account>;

    /// Create an account.
    ///
    /// Fails with `RoleConflict` when the email belongs to another role and
    /// with `AlreadyRegistered` when it already belongs to the same role. The
    /// existing row is never modified.
    async fn create_account(&self, account: NewAccount) -> AppResult<Account>;

    /// Mark the email as verified. Idempotent.
    async fn mark_verified(&self, email: &str) -> AppResult<Account>;

    /// Move an employer's review status from `from` to `to`.
    ///
    /// Callers are the employer review workflows, which have already
    /// validated the transition against `from`. If the stored status has
    /// since moved anywhere but `to`, nothing is written and the call fails
    /// with `InvalidTransition`.
    async fn set_account_status(
        &self,
        email: &str,
        from: AccountStatus,
        to: AccountStatus,
        reason: Option<String>,
    ) -> AppResult<Account>;

    /// Remember a provider identity that could not be deleted
    async fn record_cleanup(&self, cleanup: IdentityCleanup) -> AppResult<()>;

    async fn pending_cleanups(&self) -> AppResult<Vec<IdentityCleanup>>;

    async fn update_cleanup(&self, cleanup: IdentityCleanup) -> AppResult<()>;
}

/// Repository-backed registry
pub struct RegistryManager {
    accounts: Arc<dyn AccountRepository>,
    cleanups: Arc<dyn CleanupRepository>,
}

impl RegistryManager {
    pub fn new(accounts: Arc<dyn AccountRepository>, cleanups: Arc<dyn CleanupRepository>) -> Self {
        Self { accounts, cleanups }
    }

    fn conflict_with(existing: &Account, requested: &NewAccount) -> AppError {
        if existing.role != requested.role {
            AppError::RoleConflict {
                existing: existing.role,
                requested: requested.role,
            }
        } else {
            AppError::AlreadyRegistered {
                verified: existing.email_verified,
            }
        }
    }

    fn status_moved(current: AccountStatus, to: AccountStatus) -> AppError {
        AppError::InvalidTransition(format!(
            "Account status changed to {} before {} could be applied",
            current, to
        ))
    }
}

#[async_trait]
impl IdentityRegistry for RegistryManager {
    async fn lookup(&self, email: &str) -> AppResult<Account> {
        self.find(email)
            .await?
            .ok_or(AppError::AccountNotFound { requested: None })
    }

    async fn find(&self, email: &str) -> AppResult<Option<Account>> {
        let email = normalize_email(email)?;
        self.accounts.find_by_email(&email).await
    }

    async fn get(&self, id: Uuid) -> AppResult<Account> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or(AppError::AccountNotFound { requested: None })
    }

    async fn create_account(&self, account: NewAccount) -> AppResult<Account> {
        if let Some(existing) = self.accounts.find_by_email(&account.email).await? {
            return Err(Self::conflict_with(&existing, &account));
        }

        match self.accounts.insert(account.clone()).await {
            Ok(created) => {
                info!(
                    account_id = %created.id,
                    email = %created.email,
                    role = %created.role,
                    credential = %created.credential_kind,
                    "Account created"
                );
                Ok(created)
            }
            // Lost a race on the unique email; report against the winner
            Err(AppError::AlreadyRegistered { .. }) => {
                warn!(email = %account.email, "Concurrent registration detected");
                match self.accounts.find_by_email(&account.email).await? {
                    Some(existing) => Err(Self::conflict_with(&existing, &account)),
                    None => Err(AppError::internal(
                        "Unique email violation without a visible account",
                    )),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_verified(&self, email: &str) -> AppResult<Account> {
        let account = self.lookup(email).await?;
        if account.email_verified {
            return Ok(account);
        }

        let account = self
            .accounts
            .set_verified(&account.email)
            .await?
            .ok_or(AppError::AccountNotFound { requested: None })?;
        info!(account_id = %account.id, email = %email, "Email verified");
        Ok(account)
    }

    async fn set_account_status(
        &self,
        email: &str,
        from: AccountStatus,
        to: AccountStatus,
        reason: Option<String>,
    ) -> AppResult<Account> {
        let account = self.lookup(email).await?;
        if !account.is_employer() {
            return Err(AppError::validation(
                "Account status only applies to employer accounts",
            ));
        }
        if account.account_status == to {
            return Ok(account);
        }
        if account.account_status != from {
            return Err(Self::status_moved(account.account_status, to));
        }

        match self.accounts.set_status(&account.email, from, to).await? {
            Some(updated) => {
                info!(
                    account_id = %updated.id,
                    from = %from,
                    to = %to,
                    reason = reason.as_deref().unwrap_or(""),
                    "Account status changed"
                );
                Ok(updated)
            }
            // Another writer got in between the read and the update
            None => {
                let current = self.lookup(&account.email).await?;
                if current.account_status == to {
                    return Ok(current);
                }
                warn!(
                    account_id = %current.id,
                    expected = %from,
                    found = %current.account_status,
                    "Concurrent account status change"
                );
                Err(Self::status_moved(current.account_status, to))
            }
        }
    }

    async fn record_cleanup(&self, cleanup: IdentityCleanup) -> AppResult<()> {
        warn!(
            external_id = %cleanup.external_id,
            email = %cleanup.email,
            reason = %cleanup.reason,
            "Provider identity queued for cleanup"
        );
        self.cleanups.record(cleanup).await
    }

    async fn pending_cleanups(&self) -> AppResult<Vec<IdentityCleanup>> {
        self.cleanups.list_unresolved().await
    }

    async fn update_cleanup(&self, cleanup: IdentityCleanup) -> AppResult<()> {
        self.cleanups.save(cleanup).await
    }
}
