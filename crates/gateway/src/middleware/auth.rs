//! Authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use auth_service_lib::service::SessionScope;
use common::{AppError, AppResult};
use domain::{Account, Role, BEARER_TOKEN_PREFIX};

use crate::state::AppState;

/// Current authenticated account extracted from the JWT.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub scope: SessionScope,
}

impl CurrentUser {
    /// Check if user has admin role.
    pub fn is_admin(&self) -> bool {
        self.role.is_admin() && self.scope == SessionScope::Portal
    }
}

/// Check if user has admin privileges.
pub fn require_admin(user: &CurrentUser) -> AppResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Re-read the caller's account and insist on the employer role.
///
/// Both portal and review tokens are accepted. Tokens outlive status
/// changes, so employer routes never trust the claims alone.
pub async fn require_employer(state: &AppState, user: &CurrentUser) -> AppResult<Account> {
    if user.role != Role::Employer {
        return Err(AppError::Forbidden);
    }
    let account = state.registry.get(user.id).await.map_err(|e| match e {
        AppError::AccountNotFound { .. } | AppError::NotFound => AppError::Unauthorized,
        other => other,
    })?;
    if !account.is_employer() {
        return Err(AppError::Forbidden);
    }
    Ok(account)
}

/// Authentication middleware that validates JWT tokens.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request)?;
    let claims = state.auth.tokens.verify(&token)?;

    let current_user = CurrentUser {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        scope: claims.scope,
    };
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Extract bearer token from Authorization header.
fn extract_token(request: &Request<Body>) -> AppResult<String> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    auth_header
        .strip_prefix(BEARER_TOKEN_PREFIX)
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}
