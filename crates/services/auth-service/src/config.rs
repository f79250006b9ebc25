//! Auth service configuration.

use std::env;

use common::{AppError, AppResult, JwtConfig, OtpConfig};
use domain::MIN_JWT_SECRET_LENGTH;

/// Identity provider endpoint settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the Identity-Toolkit style REST API
    pub base_url: String,
    pub api_key: String,
    /// OAuth access token allowed to delete identities; unset means deletes fail
    pub admin_token: Option<String>,
    /// Redirect URI registered for single sign-on
    pub sso_request_uri: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
            api_key: String::new(),
            admin_token: None,
            sso_request_uri: "http://localhost".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("IDENTITY_PROVIDER_URL").unwrap_or(defaults.base_url),
            api_key: env::var("IDENTITY_PROVIDER_API_KEY").unwrap_or_default(),
            admin_token: env::var("IDENTITY_PROVIDER_ADMIN_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            sso_request_uri: env::var("SSO_REQUEST_URI").unwrap_or(defaults.sso_request_uri),
        }
    }
}

/// Auth service configuration.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub provider: ProviderConfig,
}

impl AuthConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            jwt: JwtConfig::from_env(),
            otp: OtpConfig::from_env(),
            provider: ProviderConfig::from_env(),
        }
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(AppError::internal(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LENGTH
            )));
        }
        if self.otp.max_attempts == 0 {
            return Err(AppError::internal("OTP_MAX_ATTEMPTS must be positive"));
        }
        if self.otp.ttl_seconds <= 0 {
            return Err(AppError::internal("OTP_TTL_SECONDS must be positive"));
        }
        Ok(())
    }
}
