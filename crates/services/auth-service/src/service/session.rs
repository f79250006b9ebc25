//! Portal session tokens.
//!
//! A session is granted only after the registry gate passes; the JWT is what
//! the gateway checks on every later request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::{AppError, AppResult, JwtConfig};
use domain::{Account, Role, MIN_JWT_SECRET_LENGTH, SECONDS_PER_HOUR, TOKEN_TYPE_BEARER};

use crate::provider::ExternalSession;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    /// Full dashboard access, granted only after every sign-in gate
    #[default]
    Portal,
    /// Employer document submission while the review is outstanding
    Review,
}

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub scope: SessionScope,
    pub exp: i64,
    pub iat: i64,
}

/// Token returned after a successful sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// JWT access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
}

/// A sign-in that passed every gate.
#[derive(Debug, Clone)]
pub struct AuthorizedSession {
    pub account: Account,
    pub token: TokenResponse,
    /// The provider session, handed back to the caller
    pub session: ExternalSession,
}

/// Signs and checks portal tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    expiration_hours: i64,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> AppResult<Self> {
        if config.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(AppError::internal(format!(
                "JWT secret must be at least {} characters",
                MIN_JWT_SECRET_LENGTH
            )));
        }
        Ok(Self {
            secret: config.secret.clone(),
            expiration_hours: config.expiration_hours,
        })
    }

    /// Generate a portal token for an account
    pub fn issue(&self, account: &Account) -> AppResult<TokenResponse> {
        self.issue_scoped(account, SessionScope::Portal)
    }

    pub fn issue_scoped(&self, account: &Account, scope: SessionScope) -> AppResult<TokenResponse> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(self.expiration_hours);

        let claims = Claims {
            sub: account.id,
            email: account.email.clone(),
            role: account.role,
            scope,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(TokenResponse {
            access_token: token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: self.expiration_hours * SECONDS_PER_HOUR,
        })
    }

    /// Verify a token and extract its claims
    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}
