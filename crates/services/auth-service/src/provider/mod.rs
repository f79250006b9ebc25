//! External identity provider contract.
//!
//! The provider authenticates credentials and hands out opaque user ids. It
//! is not the system of record for roles; the registry is. Provider failures
//! are normalised into [`ProviderError`] at the adapter, and nothing past
//! this module looks at provider-specific error shapes.

mod rest;

pub use rest::RestIdentityProvider;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::AppError;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Provider-side user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId(pub String);

impl ExternalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live provider session. Passed by value through the bridge; whoever
/// holds it last either returns it to the caller or signs it out.
#[derive(Clone, PartialEq, Eq)]
pub struct ExternalSession {
    pub external_id: ExternalId,
    pub id_token: String,
}

impl fmt::Debug for ExternalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSession")
            .field("external_id", &self.external_id)
            .field("id_token", &"[REDACTED]")
            .finish()
    }
}

/// Result of a successful provider call.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub email: String,
    /// The provider's own claim; unrelated to the registry's `email_verified`
    pub provider_email_verified: bool,
    /// The provider created the identity during this call
    pub is_new: bool,
    pub session: ExternalSession,
}

impl ExternalIdentity {
    pub fn external_id(&self) -> &ExternalId {
        &self.session.external_id
    }
}

/// Credential returned by a single sign-on redirect or popup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoAssertion {
    /// e.g. `google.com`
    pub provider_id: String,
    /// Token issued by the upstream identity provider
    pub id_token: String,
}

/// Normalised provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("An identity already exists for this email")]
    EmailExists,

    #[error("Credentials were rejected")]
    InvalidCredential,

    #[error("Identity not found")]
    IdentityNotFound,

    #[error("Identity is disabled")]
    Disabled,

    #[error("Too many attempts")]
    Throttled,

    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Map a provider error string such as `WEAK_PASSWORD : Password should
    /// be at least 6 characters` onto the closed set.
    pub fn from_code(message: &str) -> Self {
        let code = message.split(&[' ', ':'][..]).next().unwrap_or(message);
        match code {
            "EMAIL_EXISTS" => ProviderError::EmailExists,
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_IDP_RESPONSE"
            | "INVALID_ID_TOKEN" => ProviderError::InvalidCredential,
            "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => ProviderError::IdentityNotFound,
            "USER_DISABLED" => ProviderError::Disabled,
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "QUOTA_EXCEEDED" => ProviderError::Throttled,
            _ => ProviderError::Rejected(message.to_string()),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::EmailExists => AppError::IdentityExists,
            // Unknown identities look like bad passwords to the caller
            ProviderError::InvalidCredential | ProviderError::IdentityNotFound => {
                AppError::InvalidCredentials
            }
            ProviderError::Disabled => AppError::Forbidden,
            ProviderError::Throttled => AppError::TooManyRequests,
            ProviderError::Rejected(msg) => AppError::Validation(msg),
            ProviderError::Unavailable(msg) => AppError::ProviderUnavailable(msg),
        }
    }
}

/// External identity provider.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a password identity and open a session for it
    async fn create_identity(&self, email: &str, password: &str) -> Result<ExternalIdentity, ProviderError>;

    /// Check a password credential
    async fn authenticate(&self, email: &str, password: &str) -> Result<ExternalIdentity, ProviderError>;

    /// Exchange a single sign-on assertion. May create the identity.
    async fn sign_in_with_sso(&self, assertion: &SsoAssertion) -> Result<ExternalIdentity, ProviderError>;

    /// Delete an identity. Deleting an unknown id reports `IdentityNotFound`.
    async fn delete_identity(&self, id: &ExternalId) -> Result<(), ProviderError>;

    /// End a session
    async fn sign_out(&self, session: ExternalSession) -> Result<(), ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_are_normalised() {
        assert_eq!(ProviderError::from_code("EMAIL_EXISTS"), ProviderError::EmailExists);
        assert_eq!(
            ProviderError::from_code("INVALID_LOGIN_CREDENTIALS"),
            ProviderError::InvalidCredential
        );
        assert_eq!(
            ProviderError::from_code("TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"),
            ProviderError::Throttled
        );
        assert_eq!(
            ProviderError::from_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            ProviderError::Rejected(
                "WEAK_PASSWORD : Password should be at least 6 characters".to_string()
            )
        );
    }

    #[test]
    fn unknown_identity_is_indistinguishable_from_bad_password() {
        let a: AppError = ProviderError::IdentityNotFound.into();
        let b: AppError = ProviderError::InvalidCredential.into();
        assert_eq!(a.code(), b.code());
    }

    #[test]
    fn session_debug_hides_token() {
        let session = ExternalSession {
            external_id: ExternalId("u1".into()),
            id_token: "secret-token".into(),
        };
        assert!(!format!("{:?}", session).contains("secret-token"));
    }
}
