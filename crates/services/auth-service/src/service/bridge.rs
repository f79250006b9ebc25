//! Credential Provider Bridge.
//!
//! Reconciles the hosted identity provider with the Identity Registry. The
//! two share no transaction, so every provider side effect that the registry
//! does not end up matching is undone here: the identity is deleted, or at
//! least its session is closed and the leftover is recorded for `reconcile`.
//! The registry is authoritative and is never rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use common::{AppError, AppResult};
use domain::{
    normalize_email, Account, AccountStatus, CredentialKind, IdentityCleanup, IssuedChallenge,
    NewAccount, Role, MIN_PASSWORD_LENGTH,
};
use registry_service_lib::service::IdentityRegistry;

use crate::provider::{
    ExternalId, ExternalIdentity, ExternalSession, IdentityProvider, ProviderError, SsoAssertion,
};
use crate::service::otp_service::OtpService;
use crate::service::session::{AuthorizedSession, SessionScope, TokenIssuer, TokenResponse};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// What the caller meant by pressing the SSO button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SsoIntent {
    #[default]
    SignIn,
    Register,
}

/// A password registration that reached the verification step.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub account: Account,
    pub challenge: IssuedChallenge,
}

/// Where an SSO attempt ended up.
#[derive(Debug, Clone)]
pub enum SsoOutcome {
    SignedIn(AuthorizedSession),
    /// The account exists but its email is unverified; a code was sent
    VerificationRequired {
        account: Account,
        challenge: IssuedChallenge,
    },
    /// First SSO visit created the account; a code was sent
    Registered {
        account: Account,
        challenge: IssuedChallenge,
    },
}

/// Pre-flight answer for the registration and sign-in forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailCheck {
    pub email: String,
    pub registered: bool,
    pub role: Option<Role>,
    pub email_verified: bool,
}

/// How an employer proves who they are when opening a review session.
#[derive(Debug, Clone)]
pub enum ReviewCredential {
    Password { email: String, password: String },
    Sso(SsoAssertion),
}

/// Token limited to the employer's own review while it is outstanding.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    pub account: Account,
    pub token: TokenResponse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

/// Credential bridge contract.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CredentialBridge: Send + Sync {
    /// Register a self-service account with a password and send a code.
    async fn register_with_password(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> AppResult<RegistrationOutcome>;

    /// Password sign-in for the portal of `role`.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> AppResult<AuthorizedSession>;

    /// Sign in or register through single sign-on.
    async fn continue_with_sso(
        &self,
        assertion: &SsoAssertion,
        role: Role,
        intent: SsoIntent,
    ) -> AppResult<SsoOutcome>;

    /// Scoped token for an employer who cannot sign in to the portal yet
    /// because the document review is outstanding or was rejected.
    async fn open_review_session(&self, credential: ReviewCredential) -> AppResult<ReviewSession>;

    /// Report whether an email is taken, failing with `RoleConflict` when it
    /// belongs to another role than `role`.
    async fn check_email(&self, email: &str, role: Option<Role>) -> AppResult<EmailCheck>;

    /// Retry deletes of provider identities left behind by failed compensation.
    async fn reconcile(&self) -> AppResult<ReconcileReport>;

    /// Create a verified administrator account (CLI only).
    async fn bootstrap_admin(&self, email: &str, password: &str, super_admin: bool) -> AppResult<Account>;
}

/// Bridge over a live identity provider
pub struct ProviderBridge {
    provider: Arc<dyn IdentityProvider>,
    registry: Arc<dyn IdentityRegistry>,
    otp: Arc<dyn OtpService>,
    tokens: TokenIssuer,
}

impl ProviderBridge {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        registry: Arc<dyn IdentityRegistry>,
        otp: Arc<dyn OtpService>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            provider,
            registry,
            otp,
            tokens,
        }
    }

    fn conflict(existing: &Account, requested: Role) -> AppError {
        if existing.role != requested {
            AppError::RoleConflict {
                existing: existing.role,
                requested,
            }
        } else {
            AppError::AlreadyRegistered {
                verified: existing.email_verified,
            }
        }
    }

    /// Registry failures after the provider identity exists. Conflicts from a
    /// lost race pass through unchanged.
    fn profile_failure(err: AppError) -> AppError {
        match err {
            AppError::RoleConflict { .. } | AppError::AlreadyRegistered { .. } => err,
            other => AppError::ProfileCreationFailed(other.to_string()),
        }
    }

    fn check_password(password: &str) -> AppResult<()> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }

    /// End a provider session. Failures are logged only.
    async fn close(&self, session: ExternalSession) {
        let external_id = session.external_id.clone();
        if let Err(e) = self.provider.sign_out(session).await {
            warn!(external_id = %external_id, error = %e, "Provider sign-out failed");
        }
    }

    /// Delete an identity the registry disowns.
    ///
    /// If the delete fails the session is still closed and the identity is
    /// recorded for `reconcile`. Nothing here is reported to the caller.
    async fn discard_identity(&self, identity: ExternalIdentity, reason: &str) {
        let external_id = identity.session.external_id.clone();
        match self.provider.delete_identity(&external_id).await {
            Ok(()) | Err(ProviderError::IdentityNotFound) => {
                info!(external_id = %external_id, reason, "External identity deleted");
                self.close(identity.session).await;
            }
            Err(e) => {
                error!(
                    external_id = %external_id,
                    email = %identity.email,
                    reason,
                    error = %e,
                    "Compensating delete failed, identity left at provider"
                );
                self.close(identity.session).await;

                let cleanup =
                    IdentityCleanup::new(external_id.as_str(), identity.email.as_str(), reason, e.to_string());
                if let Err(record_err) = self.registry.record_cleanup(cleanup).await {
                    error!(
                        external_id = %external_id,
                        error = %record_err,
                        "Could not record identity cleanup"
                    );
                }
            }
        }
    }

    /// Drop an SSO identity that will not be used: delete it if the provider
    /// just minted it for nobody, otherwise only sign out.
    ///
    /// Without a known owner the registry is read again, since a concurrent
    /// request handed the same identity may have claimed it in the meantime.
    async fn release(&self, identity: ExternalIdentity, owner: Option<&Account>, reason: &str) {
        if !identity.is_new {
            self.close(identity.session).await;
            return;
        }

        let owned = match owner {
            Some(account) => account.owns_identity(identity.external_id().as_str()),
            None => match self.claimed(&identity.email, identity.external_id().as_str()).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    // Ownership unknown: keep the identity and let reconcile decide
                    warn!(external_id = %identity.external_id(), reason, error = %e, "Identity kept, owner unknown");
                    let cleanup = IdentityCleanup::new(
                        identity.external_id().as_str(),
                        identity.email.as_str(),
                        reason,
                        e.to_string(),
                    );
                    self.close(identity.session).await;
                    if let Err(record_err) = self.registry.record_cleanup(cleanup).await {
                        error!(error = %record_err, "Could not record identity cleanup");
                    }
                    return;
                }
            },
        };

        if owned {
            self.close(identity.session).await;
        } else {
            self.discard_identity(identity, reason).await;
        }
    }

    /// Whether some account currently references this identity
    async fn claimed(&self, email: &str, external_id: &str) -> AppResult<bool> {
        // No account can hold an email the registry would refuse
        let Ok(email) = normalize_email(email) else {
            return Ok(false);
        };
        Ok(self
            .registry
            .find(&email)
            .await?
            .map(|account| account.owns_identity(external_id))
            .unwrap_or(false))
    }

    /// Registry checks every sign-in must pass.
    async fn gate(&self, account: Option<Account>, requested: Role) -> AppResult<Account> {
        let account = account.ok_or(AppError::AccountNotFound {
            requested: Some(requested),
        })?;

        if !account.role.satisfies(requested) {
            return Err(AppError::RoleConflict {
                existing: account.role,
                requested,
            });
        }

        if !account.email_verified {
            match self.otp.resend(&account.email).await {
                Ok(_) => info!(email = %account.email, "Verification code re-sent on sign-in"),
                Err(e) => warn!(email = %account.email, error = %e, "Verification code not re-sent"),
            }
            return Err(AppError::EmailNotVerified);
        }

        if account.is_employer() {
            match account.account_status {
                AccountStatus::Verified => {}
                AccountStatus::Rejected => return Err(AppError::AccountRejected),
                AccountStatus::Suspended => return Err(AppError::AccountSuspended),
                AccountStatus::None | AccountStatus::Pending => {
                    return Err(AppError::AccountNotVerified)
                }
            }
        }

        Ok(account)
    }

    /// Checks for a review session. Suspension is the only status that bars
    /// document submission.
    async fn review_gate(&self, account: Option<Account>) -> AppResult<ReviewSession> {
        let account = account.ok_or(AppError::AccountNotFound {
            requested: Some(Role::Employer),
        })?;

        if !account.is_employer() {
            return Err(AppError::RoleConflict {
                existing: account.role,
                requested: Role::Employer,
            });
        }
        if !account.email_verified {
            return Err(AppError::EmailNotVerified);
        }
        if account.account_status == AccountStatus::Suspended {
            return Err(AppError::AccountSuspended);
        }

        let token = self.tokens.issue_scoped(&account, SessionScope::Review)?;
        Ok(ReviewSession { account, token })
    }

    /// Grant a portal session or close the provider session and fail.
    async fn authorize(
        &self,
        account: Option<Account>,
        session: ExternalSession,
        requested: Role,
    ) -> AppResult<AuthorizedSession> {
        let granted = match self.gate(account, requested).await {
            Ok(account) => self.tokens.issue(&account).map(|token| (account, token)),
            Err(e) => Err(e),
        };

        match granted {
            Ok((account, token)) => {
                info!(account_id = %account.id, role = %account.role, "Session granted");
                Ok(AuthorizedSession {
                    account,
                    token,
                    session,
                })
            }
            Err(e) => {
                warn!(external_id = %session.external_id, code = e.code(), "Sign-in refused");
                self.close(session).await;
                Err(e)
            }
        }
    }

    /// Create the provider identity and a matching registry account.
    async fn create_with_password(&self, account: NewAccount, password: &str, reason: &str) -> AppResult<Account> {
        let identity = self.provider.create_identity(&account.email, password).await?;
        let account = account.with_external_ref(identity.external_id().as_str());

        match self.registry.create_account(account).await {
            Ok(account) => {
                self.close(identity.session).await;
                Ok(account)
            }
            Err(e) => {
                warn!(email = %identity.email, error = %e, "Account creation failed after provider sign-up");
                self.discard_identity(identity, reason).await;
                Err(Self::profile_failure(e))
            }
        }
    }
}

#[async_trait]
impl CredentialBridge for ProviderBridge {
    async fn register_with_password(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> AppResult<RegistrationOutcome> {
        if !role.is_self_service() {
            return Err(AppError::validation(format!("Cannot self-register as {}", role)));
        }
        let email = normalize_email(email)?;
        Self::check_password(password)?;

        // Conflicts are settled before the provider is touched
        if let Some(existing) = self.registry.find(&email).await? {
            return Err(Self::conflict(&existing, role));
        }

        let new_account = NewAccount::new(&email, role, CredentialKind::Password)?;
        let account = self
            .create_with_password(new_account, password, "password-registration")
            .await?;
        info!(account_id = %account.id, email = %email, role = %role, "Account registered");

        // The account row stands even if the code cannot be sent
        let challenge = self.otp.issue(&email).await?;
        Ok(RegistrationOutcome { account, challenge })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> AppResult<AuthorizedSession> {
        let email = normalize_email(email)?;
        let identity = self.provider.authenticate(&email, password).await?;

        let account = match self.registry.find(&email).await {
            Ok(account) => account,
            Err(e) => {
                self.close(identity.session).await;
                return Err(e);
            }
        };
        self.authorize(account, identity.session, role).await
    }

    async fn continue_with_sso(
        &self,
        assertion: &SsoAssertion,
        role: Role,
        intent: SsoIntent,
    ) -> AppResult<SsoOutcome> {
        let identity = self.provider.sign_in_with_sso(assertion).await?;

        let email = match normalize_email(&identity.email) {
            Ok(email) => email,
            Err(e) => {
                self.release(identity, None, "sso-invalid-email").await;
                return Err(e.into());
            }
        };
        let existing = match self.registry.find(&email).await {
            Ok(existing) => existing,
            Err(e) => {
                self.release(identity, None, "sso-registry-unavailable").await;
                return Err(e);
            }
        };

        match existing {
            Some(account) if !account.role.satisfies(role) => {
                warn!(
                    email = %email,
                    existing = %account.role,
                    requested = %role,
                    "SSO attempt for an email held by another role"
                );
                self.release(identity, Some(&account), "sso-role-conflict").await;
                Err(Self::conflict(&account, role))
            }
            Some(account) if account.email_verified => self
                .authorize(Some(account), identity.session, role)
                .await
                .map(SsoOutcome::SignedIn),
            Some(account) => {
                self.release(identity, Some(&account), "sso-unverified-account").await;
                let challenge = self.otp.issue(&email).await?;
                Ok(SsoOutcome::VerificationRequired { account, challenge })
            }
            None if intent == SsoIntent::SignIn => {
                self.release(identity, None, "sso-unknown-account").await;
                Err(AppError::AccountNotFound {
                    requested: Some(role),
                })
            }
            None => {
                if !role.is_self_service() {
                    self.release(identity, None, "sso-admin-registration").await;
                    return Err(AppError::validation(format!("Cannot self-register as {}", role)));
                }

                let new_account = NewAccount::new(&email, role, CredentialKind::Sso)?
                    .with_external_ref(identity.external_id().as_str());
                let account = match self.registry.create_account(new_account).await {
                    Ok(account) => account,
                    Err(e) => {
                        warn!(email = %email, error = %e, "Account creation failed after SSO sign-up");
                        self.release(identity, None, "sso-profile-creation").await;
                        return Err(Self::profile_failure(e));
                    }
                };
                self.close(identity.session).await;
                info!(account_id = %account.id, email = %email, role = %role, "Account registered via SSO");

                let challenge = self.otp.issue(&email).await?;
                Ok(SsoOutcome::Registered { account, challenge })
            }
        }
    }

    async fn open_review_session(&self, credential: ReviewCredential) -> AppResult<ReviewSession> {
        let identity = match &credential {
            ReviewCredential::Password { email, password } => {
                let email = normalize_email(email)?;
                self.provider.authenticate(&email, password).await?
            }
            ReviewCredential::Sso(assertion) => self.provider.sign_in_with_sso(assertion).await?,
        };

        let account = match normalize_email(&identity.email) {
            Ok(email) => self.registry.find(&email).await,
            Err(e) => Err(e.into()),
        };
        let account = match account {
            Ok(account) => account,
            Err(e) => {
                self.release(identity, None, "review-lookup-failed").await;
                return Err(e);
            }
        };

        // The provider session is never handed out with a review token
        self.release(identity, account.as_ref(), "review-unknown-account").await;

        let session = self.review_gate(account).await;
        match &session {
            Ok(session) => info!(account_id = %session.account.id, "Review session granted"),
            Err(e) => warn!(code = e.code(), "Review session refused"),
        }
        session
    }

    async fn check_email(&self, email: &str, role: Option<Role>) -> AppResult<EmailCheck> {
        let email = normalize_email(email)?;
        let account = self.registry.find(&email).await?;

        if let (Some(account), Some(requested)) = (&account, role) {
            if !account.role.satisfies(requested) {
                return Err(AppError::RoleConflict {
                    existing: account.role,
                    requested,
                });
            }
        }

        Ok(EmailCheck {
            email,
            registered: account.is_some(),
            role: account.as_ref().map(|a| a.role),
            email_verified: account.map(|a| a.email_verified).unwrap_or(false),
        })
    }

    async fn reconcile(&self) -> AppResult<ReconcileReport> {
        let pending = self.registry.pending_cleanups().await?;
        let mut report = ReconcileReport::default();

        for mut cleanup in pending {
            report.attempted += 1;
            let external_id = ExternalId(cleanup.external_id.clone());

            if self.claimed(&cleanup.email, &cleanup.external_id).await? {
                cleanup.resolved_at = Some(Utc::now());
                report.resolved += 1;
                info!(external_id = %external_id, "Identity belongs to an account, kept");
                self.registry.update_cleanup(cleanup).await?;
                continue;
            }

            match self.provider.delete_identity(&external_id).await {
                Ok(()) | Err(ProviderError::IdentityNotFound) => {
                    cleanup.resolved_at = Some(Utc::now());
                    report.resolved += 1;
                    info!(external_id = %external_id, "Orphaned identity removed");
                }
                Err(e) => {
                    cleanup.attempts += 1;
                    cleanup.last_error = Some(e.to_string());
                    report.failed += 1;
                    warn!(external_id = %external_id, attempts = cleanup.attempts, error = %e, "Orphaned identity still present");
                }
            }

            self.registry.update_cleanup(cleanup).await?;
        }

        info!(
            attempted = report.attempted,
            resolved = report.resolved,
            failed = report.failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn bootstrap_admin(&self, email: &str, password: &str, super_admin: bool) -> AppResult<Account> {
        let role = if super_admin { Role::SuperAdmin } else { Role::Admin };
        let email = normalize_email(email)?;
        Self::check_password(password)?;

        if let Some(existing) = self.registry.find(&email).await? {
            return Err(Self::conflict(&existing, role));
        }

        let new_account = NewAccount::new(&email, role, CredentialKind::Password)?.verified();
        let account = self
            .create_with_password(new_account, password, "admin-bootstrap")
            .await?;
        info!(account_id = %account.id, email = %email, role = %role, "Administrator created");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::notify::RecordingNotifier;
    use common::{JwtConfig, OtpConfig};
    use registry_service_lib::service::MockIdentityRegistry;
    use registry_service_lib::testing::InMemoryStores;

    use crate::service::otp_service::{MockOtpService, OtpEngine};
    use crate::testing::FakeIdentityProvider;

    const PASSWORD: &str = "correct-horse";

    struct Harness {
        stores: InMemoryStores,
        provider: Arc<FakeIdentityProvider>,
        notifier: Arc<RecordingNotifier>,
        otp: Arc<OtpEngine>,
        tokens: TokenIssuer,
        bridge: ProviderBridge,
    }

    fn tokens() -> TokenIssuer {
        TokenIssuer::new(&JwtConfig {
            secret: "a-test-secret-that-is-long-enough-for-hs256".into(),
            expiration_hours: 1,
        })
        .unwrap()
    }

    fn harness_with(config: OtpConfig) -> Harness {
        let stores = InMemoryStores::new();
        let registry: Arc<dyn IdentityRegistry> = stores.registry();
        let notifier = Arc::new(RecordingNotifier::new());
        let otp = Arc::new(OtpEngine::new(
            stores.otp.clone(),
            registry.clone(),
            notifier.clone(),
            config,
        ));
        let provider = Arc::new(FakeIdentityProvider::new());
        let bridge = ProviderBridge::new(provider.clone(), registry, otp.clone(), tokens());
        Harness {
            stores,
            provider,
            notifier,
            otp,
            tokens: tokens(),
            bridge,
        }
    }

    fn harness() -> Harness {
        harness_with(OtpConfig::default())
    }

    fn sso(email: &str) -> SsoAssertion {
        SsoAssertion {
            provider_id: "google.com".into(),
            id_token: email.into(),
        }
    }

    fn wrong(code: &str) -> String {
        let digit = (code.as_bytes()[0] - b'0' + 1) % 10;
        format!("{}{}", digit, &code[1..])
    }

    impl Harness {
        async fn verified(&self, email: &str, role: Role) -> Account {
            self.bridge.register_with_password(email, PASSWORD, role).await.unwrap();
            let code = self.notifier.last_code(email).unwrap();
            self.otp.verify(email, &code).await.unwrap()
        }
    }

    #[tokio::test]
    async fn jobseeker_registers_exhausts_codes_then_signs_in() {
        let h = harness();

        let outcome = h
            .bridge
            .register_with_password("A@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();
        assert_eq!(outcome.account.email, "a@x.com");
        assert_eq!(outcome.account.account_status, AccountStatus::None);
        assert_eq!(h.provider.live_sessions(), 0);

        let code = h.notifier.last_code("a@x.com").unwrap();
        assert_eq!(code.len(), 6);
        for _ in 0..5 {
            assert!(h.otp.verify("a@x.com", &wrong(&code)).await.is_err());
        }
        let err = h.otp.verify("a@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AppError::TooManyAttempts));

        h.otp.issue("a@x.com").await.unwrap();
        let fresh = h.notifier.last_code("a@x.com").unwrap();
        let account = h.otp.verify("a@x.com", &fresh).await.unwrap();
        assert!(account.email_verified);

        let session = h
            .bridge
            .sign_in_with_password("a@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();
        let claims = h.tokens.verify(&session.token.access_token).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.role, Role::JobSeeker);
        assert_eq!(h.provider.live_sessions(), 1);
    }

    #[tokio::test]
    async fn sso_employer_signup_over_jobseeker_deletes_new_identity() {
        let h = harness();
        h.bridge
            .register_with_password("b@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();
        let before = h.stores.registry().lookup("b@x.com").await.unwrap();

        let err = h
            .bridge
            .continue_with_sso(&sso("b@x.com"), Role::Employer, SsoIntent::Register)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::RoleConflict {
                existing: Role::JobSeeker,
                requested: Role::Employer
            }
        ));
        assert!(!h.provider.has_sso_identity("b@x.com"));
        assert_eq!(h.provider.deleted().len(), 1);
        assert_eq!(h.provider.live_sessions(), 0);
        assert_eq!(h.stores.registry().lookup("b@x.com").await.unwrap(), before);
    }

    #[tokio::test]
    async fn failed_compensation_is_recorded_and_reconciled() {
        let h = harness();
        h.bridge
            .register_with_password("b@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();
        h.provider.set_fail_delete(true);

        let err = h
            .bridge
            .continue_with_sso(&sso("b@x.com"), Role::Employer, SsoIntent::Register)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "role-mismatch");
        assert_eq!(h.provider.live_sessions(), 0);

        let cleanups = h.stores.cleanups.all();
        assert_eq!(cleanups.len(), 1);
        assert_eq!(cleanups[0].reason, "sso-role-conflict");
        assert_eq!(cleanups[0].email, "b@x.com");

        let report = h.bridge.reconcile().await.unwrap();
        assert_eq!(report, ReconcileReport { attempted: 1, resolved: 0, failed: 1 });
        assert_eq!(h.stores.cleanups.all()[0].attempts, 2);

        h.provider.set_fail_delete(false);
        let report = h.bridge.reconcile().await.unwrap();
        assert_eq!(report.resolved, 1);
        assert!(!h.provider.has_sso_identity("b@x.com"));
        assert!(h.stores.registry().pending_cleanups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn password_conflict_never_reaches_provider() {
        let h = harness();
        h.bridge
            .register_with_password("c@x.com", PASSWORD, Role::Employer)
            .await
            .unwrap();
        let identities = h.provider.identity_count();

        let err = h
            .bridge
            .register_with_password("c@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RoleConflict { .. }));

        let err = h
            .bridge
            .register_with_password("c@x.com", PASSWORD, Role::Employer)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyRegistered { verified: false }));
        assert_eq!(h.provider.identity_count(), identities);
    }

    #[tokio::test]
    async fn profile_creation_failure_leaves_no_identity_behind() {
        let provider = Arc::new(FakeIdentityProvider::new());
        let mut registry = MockIdentityRegistry::new();
        registry.expect_find().returning(|_| Ok(None));
        registry
            .expect_create_account()
            .returning(|_| Err(AppError::internal("disk full")));

        let bridge = ProviderBridge::new(
            provider.clone(),
            Arc::new(registry),
            Arc::new(MockOtpService::new()),
            tokens(),
        );

        let err = bridge
            .register_with_password("d@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProfileCreationFailed(_)));
        assert!(!provider.has_identity("d@x.com"));
        assert_eq!(provider.live_sessions(), 0);

        let auth = provider.authenticate("d@x.com", PASSWORD).await;
        assert!(auth.is_err());
    }

    #[tokio::test]
    async fn lost_registration_race_returns_conflict_and_records_undeletable_identity() {
        let provider = Arc::new(FakeIdentityProvider::new());
        provider.set_fail_delete(true);

        let mut registry = MockIdentityRegistry::new();
        registry.expect_find().returning(|_| Ok(None));
        registry.expect_create_account().returning(|_| {
            Err(AppError::RoleConflict {
                existing: Role::Employer,
                requested: Role::JobSeeker,
            })
        });
        registry
            .expect_record_cleanup()
            .withf(|c| c.email == "e@x.com" && c.reason == "password-registration")
            .times(1)
            .returning(|_| Ok(()));

        let bridge = ProviderBridge::new(
            provider.clone(),
            Arc::new(registry),
            Arc::new(MockOtpService::new()),
            tokens(),
        );

        let err = bridge
            .register_with_password("e@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RoleConflict { .. }));
        assert_eq!(provider.live_sessions(), 0);
    }

    #[tokio::test]
    async fn lost_sso_registration_race_keeps_the_winners_identity() {
        let provider = Arc::new(FakeIdentityProvider::new());
        let now = Utc::now();
        // The concurrent request that won the insert holds the identity minted here
        let winner = Account {
            id: uuid::Uuid::new_v4(),
            email: "race@x.com".into(),
            role: Role::JobSeeker,
            email_verified: false,
            account_status: AccountStatus::None,
            credential_kind: CredentialKind::Sso,
            external_identity_ref: Some("ext-1".into()),
            created_at: now,
            updated_at: now,
        };

        let mut registry = MockIdentityRegistry::new();
        let mut lookups = 0;
        registry.expect_find().returning(move |_| {
            lookups += 1;
            Ok((lookups > 1).then(|| winner.clone()))
        });
        registry
            .expect_create_account()
            .returning(|_| Err(AppError::AlreadyRegistered { verified: false }));
        registry.expect_record_cleanup().never();

        let bridge = ProviderBridge::new(
            provider.clone(),
            Arc::new(registry),
            Arc::new(MockOtpService::new()),
            tokens(),
        );

        let err = bridge
            .continue_with_sso(&sso("race@x.com"), Role::JobSeeker, SsoIntent::Register)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "already-registered");
        assert!(provider.deleted().is_empty());
        assert!(provider.has_sso_identity("race@x.com"));
        assert_eq!(provider.live_sessions(), 0);
    }

    #[tokio::test]
    async fn reconcile_keeps_identities_an_account_has_claimed() {
        let h = harness();
        let outcome = h
            .bridge
            .continue_with_sso(&sso("m@x.com"), Role::JobSeeker, SsoIntent::Register)
            .await
            .unwrap();
        let account = match outcome {
            SsoOutcome::Registered { account, .. } => account,
            other => panic!("unexpected outcome {other:?}"),
        };
        let external_id = account.external_identity_ref.clone().unwrap();
        h.stores
            .registry()
            .record_cleanup(IdentityCleanup::new(&external_id, "m@x.com", "sso-profile-creation", "timeout"))
            .await
            .unwrap();

        let report = h.bridge.reconcile().await.unwrap();

        assert_eq!(report, ReconcileReport { attempted: 1, resolved: 1, failed: 0 });
        assert!(h.provider.deleted().is_empty());
        assert!(h.provider.has_sso_identity("m@x.com"));
    }

    #[tokio::test]
    async fn employer_needs_verified_status_to_sign_in() {
        let h = harness();
        h.verified("f@x.com", Role::Employer).await;
        let registry = h.stores.registry();

        let sign_in = || h.bridge.sign_in_with_password("f@x.com", PASSWORD, Role::Employer);

        assert!(matches!(sign_in().await.unwrap_err(), AppError::AccountNotVerified));

        let cases = [
            (AccountStatus::Pending, "account-not-verified"),
            (AccountStatus::Rejected, "account-rejected"),
            (AccountStatus::Suspended, "account-suspended"),
        ];
        let mut current = AccountStatus::None;
        for (status, code) in cases {
            registry
                .set_account_status("f@x.com", current, status, None)
                .await
                .unwrap();
            current = status;
            assert_eq!(sign_in().await.unwrap_err().code(), code);
            assert_eq!(h.provider.live_sessions(), 0);
        }

        registry
            .set_account_status("f@x.com", current, AccountStatus::Verified, None)
            .await
            .unwrap();
        let session = sign_in().await.unwrap();
        assert_eq!(session.account.account_status, AccountStatus::Verified);
    }

    #[tokio::test]
    async fn unverified_sign_in_resends_code_and_closes_session() {
        let h = harness_with(OtpConfig {
            resend_cooldown_seconds: 0,
            ..OtpConfig::default()
        });
        h.bridge
            .register_with_password("g@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();

        let err = h
            .bridge
            .sign_in_with_password("g@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmailNotVerified));
        assert_eq!(h.notifier.sent().len(), 2);
        assert_eq!(h.provider.live_sessions(), 0);
    }

    #[tokio::test]
    async fn sign_in_failures_fail_closed() {
        let h = harness();
        h.verified("h@x.com", Role::JobSeeker).await;

        let err = h
            .bridge
            .sign_in_with_password("h@x.com", "not-the-password", Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        let err = h
            .bridge
            .sign_in_with_password("nobody@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        let err = h
            .bridge
            .sign_in_with_password("h@x.com", PASSWORD, Role::Employer)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RoleConflict { .. }));

        // Provider knows the identity, the registry does not
        h.provider.seed_identity("ghost@x.com", PASSWORD);
        let err = h
            .bridge
            .sign_in_with_password("ghost@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountNotFound { requested: Some(Role::JobSeeker) }));
        assert_eq!(h.provider.live_sessions(), 0);
    }

    #[tokio::test]
    async fn sso_registration_then_sign_in() {
        let h = harness();

        let outcome = h
            .bridge
            .continue_with_sso(&sso("i@x.com"), Role::JobSeeker, SsoIntent::Register)
            .await
            .unwrap();
        let account = match outcome {
            SsoOutcome::Registered { account, .. } => account,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(account.credential_kind, CredentialKind::Sso);
        assert!(account.external_identity_ref.is_some());
        assert_eq!(h.provider.live_sessions(), 0);

        let code = h.notifier.last_code("i@x.com").unwrap();
        h.otp.verify("i@x.com", &code).await.unwrap();

        let outcome = h
            .bridge
            .continue_with_sso(&sso("i@x.com"), Role::JobSeeker, SsoIntent::SignIn)
            .await
            .unwrap();
        assert!(matches!(outcome, SsoOutcome::SignedIn(_)));
        assert_eq!(h.provider.identity_count(), 1);
        assert_eq!(h.provider.live_sessions(), 1);
    }

    #[tokio::test]
    async fn sso_on_unverified_account_reissues_code_and_drops_stray_identity() {
        let h = harness();
        h.bridge
            .register_with_password("j@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();

        let outcome = h
            .bridge
            .continue_with_sso(&sso("j@x.com"), Role::JobSeeker, SsoIntent::Register)
            .await
            .unwrap();
        assert!(matches!(outcome, SsoOutcome::VerificationRequired { .. }));
        assert!(!h.provider.has_sso_identity("j@x.com"));
        assert_eq!(h.notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn sso_sign_in_without_account_fails_and_deletes_identity() {
        let h = harness();

        let err = h
            .bridge
            .continue_with_sso(&sso("k@x.com"), Role::Employer, SsoIntent::SignIn)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountNotFound { .. }));
        assert_eq!(h.provider.identity_count(), 0);
        assert!(h.stores.accounts.all().is_empty());
    }

    #[tokio::test]
    async fn check_email_reports_role_ownership() {
        let h = harness();
        let check = h.bridge.check_email("l@x.com", Some(Role::Employer)).await.unwrap();
        assert!(!check.registered);

        h.bridge
            .register_with_password("l@x.com", PASSWORD, Role::JobSeeker)
            .await
            .unwrap();
        let check = h.bridge.check_email("L@x.com", None).await.unwrap();
        assert!(check.registered);
        assert_eq!(check.role, Some(Role::JobSeeker));
        assert!(!check.email_verified);

        let err = h
            .bridge
            .check_email("l@x.com", Some(Role::Employer))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "role-mismatch");
    }

    #[tokio::test]
    async fn administrators_are_bootstrapped_not_registered() {
        let h = harness();

        let err = h
            .bridge
            .register_with_password("root@x.com", PASSWORD, Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation-error");
        assert_eq!(h.provider.identity_count(), 0);

        let admin = h.bridge.bootstrap_admin("root@x.com", PASSWORD, true).await.unwrap();
        assert!(admin.email_verified);
        assert_eq!(admin.role, Role::SuperAdmin);

        let session = h
            .bridge
            .sign_in_with_password("root@x.com", PASSWORD, Role::Admin)
            .await
            .unwrap();
        assert_eq!(session.account.role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn review_session_lets_unreviewed_employers_in() {
        let h = harness();
        h.verified("hr@acme.com", Role::Employer).await;

        let err = h
            .bridge
            .sign_in_with_password("hr@acme.com", PASSWORD, Role::Employer)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "account-not-verified");

        let review = h
            .bridge
            .open_review_session(ReviewCredential::Password {
                email: "HR@acme.com".into(),
                password: PASSWORD.into(),
            })
            .await
            .unwrap();
        assert_eq!(review.account.email, "hr@acme.com");
        let claims = h.tokens.verify(&review.token.access_token).unwrap();
        assert_eq!(claims.scope, SessionScope::Review);
        assert_eq!(h.provider.live_sessions(), 0);
    }

    #[tokio::test]
    async fn review_session_is_refused_outside_an_employer_review() {
        let h = harness();
        h.verified("seeker@x.com", Role::JobSeeker).await;
        h.verified("hr@acme.com", Role::Employer).await;
        h.stores
            .registry()
            .set_account_status("hr@acme.com", AccountStatus::None, AccountStatus::Suspended, None)
            .await
            .unwrap();

        let seeker = h
            .bridge
            .open_review_session(ReviewCredential::Password {
                email: "seeker@x.com".into(),
                password: PASSWORD.into(),
            })
            .await
            .unwrap_err();
        assert_eq!(seeker.code(), "role-mismatch");

        let suspended = h
            .bridge
            .open_review_session(ReviewCredential::Password {
                email: "hr@acme.com".into(),
                password: PASSWORD.into(),
            })
            .await
            .unwrap_err();
        assert_eq!(suspended.code(), "account-suspended");

        let unknown = h
            .bridge
            .open_review_session(ReviewCredential::Sso(sso("ghost@x.com")))
            .await
            .unwrap_err();
        assert_eq!(unknown.code(), "account-not-found");
        assert!(!h.provider.has_identity("ghost@x.com"));
        assert_eq!(h.provider.live_sessions(), 0);
    }

    #[tokio::test]
    async fn short_passwords_are_rejected_before_the_provider() {
        let h = harness();
        let err = h
            .bridge
            .register_with_password("m@x.com", "short", Role::JobSeeker)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation-error");
        assert_eq!(h.provider.identity_count(), 0);
    }
}
