//! OTP Verification Engine.
//!
//! Issues, stores and checks six digit codes bound to an email. Every issue
//! replaces the email's previous challenge, so only the newest code can ever
//! verify. The engine does not care how the credential was created.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use common::{AppError, AppResult, Notifier, OtpConfig, TemplateKind};
use domain::{normalize_email, Account, IssuedChallenge, OtpChallenge, OtpCode};
use registry_service_lib::repository::OtpRepository;
use registry_service_lib::service::IdentityRegistry;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// OTP service contract.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait OtpService: Send + Sync {
    /// Issue a fresh code, invalidating the previous one, and send it.
    ///
    /// A transport failure is reported as `DeliveryFailed`; the stored
    /// challenge stays in place either way.
    async fn issue(&self, email: &str) -> AppResult<IssuedChallenge>;

    /// Check a code against the active challenge and mark the email verified.
    async fn verify(&self, email: &str, code: &str) -> AppResult<Account>;

    /// Issue again for an unverified account once the cooldown has passed.
    async fn resend(&self, email: &str) -> AppResult<IssuedChallenge>;
}

/// Repository-backed OTP engine
pub struct OtpEngine {
    challenges: Arc<dyn OtpRepository>,
    registry: Arc<dyn IdentityRegistry>,
    notifier: Arc<dyn Notifier>,
    config: OtpConfig,
}

impl OtpEngine {
    pub fn new(
        challenges: Arc<dyn OtpRepository>,
        registry: Arc<dyn IdentityRegistry>,
        notifier: Arc<dyn Notifier>,
        config: OtpConfig,
    ) -> Self {
        Self {
            challenges,
            registry,
            notifier,
            config,
        }
    }

    /// Explain why a conditional consume matched nothing.
    async fn lost_consume(&self, challenge: &OtpChallenge) -> AppResult<AppError> {
        let current = self.challenges.find(&challenge.email).await?;
        Ok(match current {
            Some(c) if c.id == challenge.id && c.is_consumed() => AppError::CodeConsumed,
            Some(c) if c.id == challenge.id && c.is_exhausted(self.config.max_attempts) => {
                AppError::TooManyAttempts
            }
            _ => AppError::NoActiveCode,
        })
    }
}

#[async_trait]
impl OtpService for OtpEngine {
    async fn issue(&self, email: &str) -> AppResult<IssuedChallenge> {
        let email = normalize_email(email)?;
        let code = OtpCode::generate();
        let challenge = OtpChallenge::new(
            &email,
            &code,
            Duration::seconds(self.config.ttl_seconds),
            Utc::now(),
        )?;

        self.challenges.put(challenge.clone()).await?;
        info!(
            email = %email,
            challenge_id = %challenge.id,
            expires_at = %challenge.expires_at,
            "Verification code issued"
        );

        let payload = json!({
            "code": code.as_str(),
            "expires_at": challenge.expires_at,
            "ttl_minutes": self.config.ttl_seconds / 60,
        });
        match self
            .notifier
            .send(&email, TemplateKind::VerificationCode, payload)
            .await
        {
            Ok(delivery) => {
                info!(email = %email, delivery_id = %delivery.0, "Verification code sent");
            }
            Err(AppError::DeliveryFailed(detail)) => {
                warn!(email = %email, error = %detail, "Verification code delivery failed");
                return Err(AppError::DeliveryFailed(detail));
            }
            Err(e) => {
                warn!(email = %email, error = %e, "Verification code delivery failed");
                return Err(AppError::delivery_failed(e.to_string()));
            }
        }

        Ok(IssuedChallenge::from(&challenge))
    }

    async fn verify(&self, email: &str, code: &str) -> AppResult<Account> {
        let email = normalize_email(email)?;
        let now = Utc::now();
        let max_attempts = self.config.max_attempts;

        let challenge = self
            .challenges
            .find(&email)
            .await?
            .ok_or(AppError::NoActiveCode)?;

        if challenge.is_consumed() {
            return Err(AppError::CodeConsumed);
        }
        if challenge.is_expired(now) {
            return Err(AppError::CodeExpired);
        }
        if challenge.is_exhausted(max_attempts) {
            return Err(AppError::TooManyAttempts);
        }

        // Malformed input is not a guess and costs no attempt
        let code = OtpCode::parse(code)?;

        if !code.matches(&challenge.code_hash) {
            return match self.challenges.record_failed_attempt(challenge.id).await? {
                None => Err(AppError::NoActiveCode),
                Some(attempts) if attempts >= max_attempts => {
                    warn!(email = %email, challenge_id = %challenge.id, "Verification code exhausted");
                    Err(AppError::TooManyAttempts)
                }
                Some(attempts) => Err(AppError::InvalidCode {
                    remaining_attempts: max_attempts - attempts,
                }),
            };
        }

        if !self
            .challenges
            .consume(challenge.id, max_attempts, now)
            .await?
        {
            return Err(self.lost_consume(&challenge).await?);
        }
        info!(email = %email, challenge_id = %challenge.id, "Verification code consumed");

        self.registry.mark_verified(&email).await
    }

    async fn resend(&self, email: &str) -> AppResult<IssuedChallenge> {
        let email = normalize_email(email)?;
        let account = self.registry.lookup(&email).await?;
        if account.email_verified {
            return Err(AppError::AlreadyRegistered { verified: true });
        }

        if let Some(current) = self.challenges.find(&email).await? {
            let cooldown = Duration::seconds(self.config.resend_cooldown_seconds);
            if let Some(remaining) = current.cooldown_remaining(Utc::now(), cooldown) {
                return Err(AppError::ResendCooldown {
                    retry_after_seconds: remaining.num_seconds().max(1),
                });
            }
        }

        self.issue(&email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::notify::{MockNotifier, RecordingNotifier};
    use domain::{CredentialKind, NewAccount, Role};
    use registry_service_lib::testing::InMemoryStores;

    struct Fixture {
        stores: InMemoryStores,
        notifier: Arc<RecordingNotifier>,
        engine: OtpEngine,
    }

    fn fixture_with(config: OtpConfig) -> Fixture {
        let stores = InMemoryStores::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = OtpEngine::new(stores.otp.clone(), stores.registry(), notifier.clone(), config);
        Fixture {
            stores,
            notifier,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(OtpConfig::default())
    }

    async fn register(fx: &Fixture, email: &str) {
        fx.stores
            .registry()
            .create_account(NewAccount::new(email, Role::JobSeeker, CredentialKind::Password).unwrap())
            .await
            .unwrap();
    }

    fn wrong(code: &str) -> String {
        let digit = (code.as_bytes()[0] - b'0' + 1) % 10;
        format!("{}{}", digit, &code[1..])
    }

    #[tokio::test]
    async fn only_the_newest_code_verifies() {
        let fx = fixture();
        register(&fx, "a@x.com").await;

        fx.engine.issue("a@x.com").await.unwrap();
        let first = fx.notifier.last_code("a@x.com").unwrap();
        fx.engine.issue("a@x.com").await.unwrap();
        let second = fx.notifier.last_code("a@x.com").unwrap();

        if first != second {
            let err = fx.engine.verify("a@x.com", &first).await.unwrap_err();
            assert_eq!(err.code(), "invalid-code");
        }
        let account = fx.engine.verify("a@x.com", &second).await.unwrap();
        assert!(account.email_verified);
    }

    #[tokio::test]
    async fn attempt_ceiling_invalidates_the_challenge() {
        let fx = fixture();
        register(&fx, "a@x.com").await;
        fx.engine.issue("a@x.com").await.unwrap();
        let code = fx.notifier.last_code("a@x.com").unwrap();

        for attempt in 1..=4u32 {
            match fx.engine.verify("a@x.com", &wrong(&code)).await.unwrap_err() {
                AppError::InvalidCode { remaining_attempts } => {
                    assert_eq!(remaining_attempts, 5 - attempt)
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        let fifth = fx.engine.verify("a@x.com", &wrong(&code)).await.unwrap_err();
        assert!(matches!(fifth, AppError::TooManyAttempts));

        let correct = fx.engine.verify("a@x.com", &code).await.unwrap_err();
        assert!(matches!(correct, AppError::TooManyAttempts));
        assert!(!fx.stores.registry().lookup("a@x.com").await.unwrap().email_verified);
    }

    #[tokio::test]
    async fn consumed_and_missing_codes_have_distinct_errors() {
        let fx = fixture();
        register(&fx, "a@x.com").await;

        let err = fx.engine.verify("a@x.com", "123456").await.unwrap_err();
        assert!(matches!(err, AppError::NoActiveCode));

        fx.engine.issue("a@x.com").await.unwrap();
        let code = fx.notifier.last_code("a@x.com").unwrap();
        fx.engine.verify("a@x.com", &code).await.unwrap();

        let again = fx.engine.verify("a@x.com", &code).await.unwrap_err();
        assert!(matches!(again, AppError::CodeConsumed));
    }

    #[tokio::test]
    async fn expired_codes_fail_with_code_expired() {
        let fx = fixture_with(OtpConfig {
            ttl_seconds: 0,
            ..OtpConfig::default()
        });
        register(&fx, "a@x.com").await;
        fx.engine.issue("a@x.com").await.unwrap();
        let code = fx.notifier.last_code("a@x.com").unwrap();

        let err = fx.engine.verify("a@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AppError::CodeExpired));
    }

    #[tokio::test]
    async fn malformed_codes_cost_no_attempt() {
        let fx = fixture();
        register(&fx, "a@x.com").await;
        fx.engine.issue("a@x.com").await.unwrap();

        let err = fx.engine.verify("a@x.com", "12ab").await.unwrap_err();
        assert_eq!(err.code(), "validation-error");
        assert_eq!(fx.stores.otp.current("a@x.com").unwrap().attempt_count, 0);
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_and_challenge_kept() {
        let fx = fixture();
        register(&fx, "a@x.com").await;
        fx.notifier.set_failing(true);

        let err = fx.engine.issue("a@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::DeliveryFailed(_)));
        assert!(fx.stores.otp.current("a@x.com").is_some());
    }

    #[tokio::test]
    async fn unexpected_transport_errors_become_delivery_failures() {
        let stores = InMemoryStores::new();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .returning(|_, _, _| Err(AppError::internal("template missing")));
        let engine = OtpEngine::new(
            stores.otp.clone(),
            stores.registry(),
            Arc::new(notifier),
            OtpConfig::default(),
        );

        let err = engine.issue("a@x.com").await.unwrap_err();
        assert_eq!(err.code(), "delivery-failed");
    }

    #[tokio::test]
    async fn resend_honours_cooldown_and_verification_state() {
        let fx = fixture();
        register(&fx, "a@x.com").await;

        fx.engine.resend("a@x.com").await.unwrap();
        let err = fx.engine.resend("a@x.com").await.unwrap_err();
        match err {
            AppError::ResendCooldown { retry_after_seconds } => {
                assert!(retry_after_seconds > 0 && retry_after_seconds <= 60)
            }
            other => panic!("unexpected error {other:?}"),
        }

        let code = fx.notifier.last_code("a@x.com").unwrap();
        fx.engine.verify("a@x.com", &code).await.unwrap();
        let err = fx.engine.resend("a@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyRegistered { verified: true }));
    }

    #[tokio::test]
    async fn codes_never_reach_the_store_in_plain_text() {
        let fx = fixture();
        register(&fx, "a@x.com").await;
        fx.engine.issue("a@x.com").await.unwrap();

        let code = fx.notifier.last_code("a@x.com").unwrap();
        let stored = fx.stores.otp.current("a@x.com").unwrap();
        assert!(!stored.code_hash.contains(&code));
    }
}
