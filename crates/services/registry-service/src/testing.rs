//! In-memory repositories for tests in this and downstream crates.
//!
//! They follow the storage semantics of the SeaORM stores: unique emails,
//! one code slot per email, id-conditional code updates, append-only
//! document entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{
    Account, AccountStatus, EmployerVerificationCase, IdentityCleanup, NewAccount, OtpChallenge,
    VerificationDocument,
};

use crate::repository::{AccountRepository, CaseRepository, CleanupRepository, OtpRepository};
use crate::service::RegistryManager;

fn offline() -> AppError {
    AppError::Database(DbErr::Custom("storage offline".to_string()))
}

/// Account table keyed by email.
#[derive(Default)]
pub struct InMemoryAccounts {
    rows: Mutex<HashMap<String, Account>>,
    unavailable: Mutex<bool>,
}

impl InMemoryAccounts {
    /// Make every call fail like a lost database connection
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn all(&self) -> Vec<Account> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    fn check(&self) -> AppResult<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(offline());
        }
        Ok(())
    }

    fn update<F>(&self, email: &str, f: F) -> AppResult<Option<Account>>
    where
        F: FnOnce(&mut Account),
    {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(email).map(|account| {
            f(account);
            account.updated_at = Utc::now();
            account.clone()
        }))
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccounts {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Account>> {
        self.check()?;
        Ok(self.rows.lock().unwrap().get(email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Account>> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn insert(&self, account: NewAccount) -> AppResult<Account> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&account.email) {
            return Err(AppError::AlreadyRegistered { verified: false });
        }
        let now = Utc::now();
        let created = Account {
            id: Uuid::new_v4(),
            email: account.email.clone(),
            role: account.role,
            email_verified: account.email_verified,
            account_status: AccountStatus::None,
            credential_kind: account.credential_kind,
            external_identity_ref: account.external_identity_ref,
            created_at: now,
            updated_at: now,
        };
        rows.insert(account.email, created.clone());
        Ok(created)
    }

    async fn set_verified(&self, email: &str) -> AppResult<Option<Account>> {
        self.update(email, |a| a.email_verified = true)
    }

    async fn set_status(
        &self,
        email: &str,
        from: AccountStatus,
        to: AccountStatus,
    ) -> AppResult<Option<Account>> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .get_mut(email)
            .filter(|account| account.account_status == from)
            .map(|account| {
                account.account_status = to;
                account.updated_at = Utc::now();
                account.clone()
            }))
    }
}

/// Code slots keyed by email.
#[derive(Default)]
pub struct InMemoryOtp {
    slots: Mutex<HashMap<String, OtpChallenge>>,
}

impl InMemoryOtp {
    pub fn current(&self, email: &str) -> Option<OtpChallenge> {
        self.slots.lock().unwrap().get(email).cloned()
    }
}

#[async_trait]
impl OtpRepository for InMemoryOtp {
    async fn find(&self, email: &str) -> AppResult<Option<OtpChallenge>> {
        Ok(self.current(email))
    }

    async fn put(&self, challenge: OtpChallenge) -> AppResult<()> {
        self.slots
            .lock()
            .unwrap()
            .insert(challenge.email.clone(), challenge);
        Ok(())
    }

    async fn record_failed_attempt(&self, id: Uuid) -> AppResult<Option<u32>> {
        let mut slots = self.slots.lock().unwrap();
        Ok(slots
            .values_mut()
            .find(|c| c.id == id && c.consumed_at.is_none())
            .map(|c| {
                c.attempt_count += 1;
                c.attempt_count
            }))
    }

    async fn consume(&self, id: Uuid, max_attempts: u32, at: DateTime<Utc>) -> AppResult<bool> {
        let mut slots = self.slots.lock().unwrap();
        match slots.values_mut().find(|c| {
            c.id == id && c.consumed_at.is_none() && c.attempt_count < max_attempts
        }) {
            Some(challenge) => {
                challenge.consumed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Cases keyed by id, documents stored inline.
#[derive(Default)]
pub struct InMemoryCases {
    cases: Mutex<Vec<EmployerVerificationCase>>,
}

impl InMemoryCases {
    fn sorted(mut cases: Vec<EmployerVerificationCase>) -> Vec<EmployerVerificationCase> {
        for case in cases.iter_mut() {
            case.documents.sort_by_key(|d| d.position);
        }
        cases
    }
}

#[async_trait]
impl CaseRepository for InMemoryCases {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EmployerVerificationCase>> {
        Ok(self
            .cases
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_active(&self, account_id: Uuid) -> AppResult<Option<EmployerVerificationCase>> {
        // Insertion order doubles as creation order
        Ok(self
            .cases
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.account_id == account_id)
            .cloned())
    }

    async fn history(&self, account_id: Uuid) -> AppResult<Vec<EmployerVerificationCase>> {
        let cases = self
            .cases
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        Ok(Self::sorted(cases))
    }

    async fn list(&self, status: Option<AccountStatus>) -> AppResult<Vec<EmployerVerificationCase>> {
        let cases = self
            .cases
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|c| status.map(|s| c.status == s).unwrap_or(true))
            .cloned()
            .collect();
        Ok(Self::sorted(cases))
    }

    async fn create(&self, case: EmployerVerificationCase) -> AppResult<bool> {
        let mut cases = self.cases.lock().unwrap();
        if cases
            .iter()
            .any(|c| c.account_id == case.account_id && c.is_open())
        {
            return Ok(false);
        }
        cases.push(case);
        Ok(true)
    }

    async fn append_document(&self, document: VerificationDocument) -> AppResult<()> {
        let mut cases = self.cases.lock().unwrap();
        let case = cases
            .iter_mut()
            .find(|c| c.id == document.case_id)
            .ok_or(AppError::NotFound)?;
        if case.documents.iter().any(|d| d.position == document.position) {
            return Err(AppError::internal("Duplicate document position"));
        }
        case.documents.push(document);
        Ok(())
    }

    async fn update_review(&self, document: VerificationDocument) -> AppResult<()> {
        let mut cases = self.cases.lock().unwrap();
        let stored = cases
            .iter_mut()
            .flat_map(|c| c.documents.iter_mut())
            .find(|d| d.id == document.id)
            .ok_or(AppError::NotFound)?;
        stored.review_status = document.review_status;
        stored.reviewer_note = document.reviewer_note;
        stored.reviewed_by = document.reviewed_by;
        stored.reviewed_at = document.reviewed_at;
        Ok(())
    }

    async fn transition(&self, case: &EmployerVerificationCase, from: AccountStatus) -> AppResult<bool> {
        let mut cases = self.cases.lock().unwrap();
        match cases.iter_mut().find(|c| c.id == case.id && c.status == from) {
            Some(stored) => {
                stored.status = case.status;
                stored.decided_by = case.decided_by.clone();
                stored.decided_at = case.decided_at;
                stored.decision_reason = case.decision_reason.clone();
                stored.updated_at = case.updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_notified(&self, case_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let mut cases = self.cases.lock().unwrap();
        let stored = cases
            .iter_mut()
            .find(|c| c.id == case_id)
            .ok_or(AppError::NotFound)?;
        stored.notified_at = Some(at);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCleanups {
    rows: Mutex<Vec<IdentityCleanup>>,
}

impl InMemoryCleanups {
    pub fn all(&self) -> Vec<IdentityCleanup> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl CleanupRepository for InMemoryCleanups {
    async fn record(&self, cleanup: IdentityCleanup) -> AppResult<()> {
        self.rows.lock().unwrap().push(cleanup);
        Ok(())
    }

    async fn list_unresolved(&self) -> AppResult<Vec<IdentityCleanup>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.is_resolved())
            .cloned()
            .collect())
    }

    async fn save(&self, cleanup: IdentityCleanup) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let stored = rows
            .iter_mut()
            .find(|c| c.id == cleanup.id)
            .ok_or(AppError::NotFound)?;
        *stored = cleanup;
        Ok(())
    }
}

/// All in-memory stores plus a registry over them.
#[derive(Clone, Default)]
pub struct InMemoryStores {
    pub accounts: Arc<InMemoryAccounts>,
    pub otp: Arc<InMemoryOtp>,
    pub cases: Arc<InMemoryCases>,
    pub cleanups: Arc<InMemoryCleanups>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> Arc<RegistryManager> {
        Arc::new(RegistryManager::new(
            self.accounts.clone(),
            self.cleanups.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::IdentityRegistry;
    use domain::{CredentialKind, OtpCode, Role};

    #[tokio::test]
    async fn role_exclusivity_holds_for_every_role_pair() {
        let roles = [Role::JobSeeker, Role::Employer, Role::Admin, Role::SuperAdmin];
        for first in roles {
            for second in roles.iter().copied().filter(|r| *r != first) {
                let stores = InMemoryStores::new();
                let registry = stores.registry();
                let created = registry
                    .create_account(NewAccount::new("a@x.com", first, CredentialKind::Password).unwrap())
                    .await
                    .unwrap();

                let err = registry
                    .create_account(NewAccount::new("a@x.com", second, CredentialKind::Sso).unwrap())
                    .await
                    .unwrap_err();
                assert_eq!(err.code(), "role-mismatch");

                let unchanged = registry.lookup("a@x.com").await.unwrap();
                assert_eq!(unchanged, created);
            }
        }
    }

    #[tokio::test]
    async fn a_new_put_replaces_the_previous_challenge() {
        let otp = InMemoryOtp::default();
        let now = Utc::now();
        let first = OtpChallenge::new("a@x.com", &OtpCode::generate(), chrono::Duration::minutes(10), now).unwrap();
        let second = OtpChallenge::new("a@x.com", &OtpCode::generate(), chrono::Duration::minutes(10), now).unwrap();

        otp.put(first.clone()).await.unwrap();
        otp.put(second.clone()).await.unwrap();

        assert_eq!(otp.record_failed_attempt(first.id).await.unwrap(), None);
        assert!(!otp.consume(first.id, 5, now).await.unwrap());
        assert!(otp.consume(second.id, 5, now).await.unwrap());
    }

    #[tokio::test]
    async fn only_one_undecided_case_per_account() {
        let cases = InMemoryCases::default();
        let account_id = Uuid::new_v4();
        let now = Utc::now();

        assert!(cases
            .create(EmployerVerificationCase::open(account_id, "e@x.com", now))
            .await
            .unwrap());
        assert!(!cases
            .create(EmployerVerificationCase::open(account_id, "e@x.com", now))
            .await
            .unwrap());
        assert_eq!(cases.history(account_id).await.unwrap().len(), 1);
    }
}
