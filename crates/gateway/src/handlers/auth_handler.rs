//! Registration, sign-in and email verification handlers.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use auth_service_lib::service::{
    AuthorizedSession, EmailCheck, ReviewCredential, ReviewSession, SsoIntent, SsoOutcome,
};
use auth_service_lib::provider::SsoAssertion;
use common::{ApiResponse, AppError, AppResult, Created};
use domain::{Account, AccountResponse, IssuedChallenge, Role};

use crate::extractors::ValidatedJson;
use crate::state::AppState;

/// Password registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "correct-horse-battery")]
    pub password: String,
    /// Portal the account belongs to (`jobseeker` or `employer`)
    pub role: Role,
}

/// Password sign-in request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignInRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Portal being signed into
    pub role: Role,
}

/// Single sign-on request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SsoRequest {
    #[validate(length(min = 1, message = "Provider is required"))]
    #[schema(example = "google.com")]
    pub provider_id: String,
    #[validate(length(min = 1, message = "Identity token is required"))]
    pub id_token: String,
    pub role: Role,
    /// `sign_in` (default) or `register`
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "sign_in")]
    pub intent: SsoIntent,
}

/// SSO profile creation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, message = "Provider is required"))]
    #[schema(example = "google.com")]
    pub provider_id: String,
    #[validate(length(min = 1, message = "Identity token is required"))]
    pub id_token: String,
    pub role: Role,
}

/// Verification code request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Verification code submission
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    #[schema(example = "042517")]
    pub code: String,
}

/// Employer review session request: a password or an SSO assertion
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReviewSessionRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub password: Option<String>,
    #[schema(example = "google.com")]
    pub provider_id: Option<String>,
    pub id_token: Option<String>,
}

impl ReviewSessionRequest {
    fn into_credential(self) -> AppResult<ReviewCredential> {
        match self {
            Self {
                provider_id: Some(provider_id),
                id_token: Some(id_token),
                ..
            } => Ok(ReviewCredential::Sso(SsoAssertion {
                provider_id,
                id_token,
            })),
            Self {
                email: Some(email),
                password: Some(password),
                ..
            } => Ok(ReviewCredential::Password { email, password }),
            _ => Err(AppError::validation(
                "Provide email and password, or provider_id and id_token",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailQuery {
    pub role: Option<Role>,
}

/// Signed-in session
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub account: AccountResponse,
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub expires_in: i64,
    /// Identity provider token for client-side calls
    pub provider_token: String,
}

impl From<AuthorizedSession> for SessionResponse {
    fn from(session: AuthorizedSession) -> Self {
        Self {
            account: AccountResponse::from(session.account),
            access_token: session.token.access_token,
            token_type: session.token.token_type,
            expires_in: session.token.expires_in,
            provider_token: session.session.id_token,
        }
    }
}

/// Token for the employer document review routes only
#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewSessionResponse {
    pub account: AccountResponse,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<ReviewSession> for ReviewSessionResponse {
    fn from(session: ReviewSession) -> Self {
        Self {
            account: AccountResponse::from(session.account),
            access_token: session.token.access_token,
            token_type: session.token.token_type,
            expires_in: session.token.expires_in,
        }
    }
}

/// Account waiting for its email to be verified
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingVerification {
    pub account: AccountResponse,
    pub challenge: IssuedChallenge,
}

impl PendingVerification {
    fn new(account: Account, challenge: IssuedChallenge) -> Self {
        Self {
            account: AccountResponse::from(account),
            challenge,
        }
    }
}

/// Result of an SSO attempt
#[derive(Debug, Serialize, ToSchema)]
pub struct SsoResponse {
    /// `signed_in`, `verification_required` or `registered`
    #[schema(example = "signed_in")]
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<PendingVerification>,
}

impl From<SsoOutcome> for SsoResponse {
    fn from(outcome: SsoOutcome) -> Self {
        match outcome {
            SsoOutcome::SignedIn(session) => Self {
                outcome: "signed_in".to_string(),
                session: Some(session.into()),
                verification: None,
            },
            SsoOutcome::VerificationRequired { account, challenge } => Self {
                outcome: "verification_required".to_string(),
                session: None,
                verification: Some(PendingVerification::new(account, challenge)),
            },
            SsoOutcome::Registered { account, challenge } => Self {
                outcome: "registered".to_string(),
                session: None,
                verification: Some(PendingVerification::new(account, challenge)),
            },
        }
    }
}

/// Email availability answer
#[derive(Debug, Serialize, ToSchema)]
pub struct EmailCheckResponse {
    pub email: String,
    pub registered: bool,
    pub role: Option<Role>,
    pub email_verified: bool,
}

impl From<EmailCheck> for EmailCheckResponse {
    fn from(check: EmailCheck) -> Self {
        Self {
            email: check.email,
            registered: check.registered,
            role: check.role,
            email_verified: check.email_verified,
        }
    }
}

/// Create auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/sign-in", post(sign_in))
        .route("/sso", post(sso))
        .route("/create-profile", post(create_profile))
        .route("/review-session", post(review_session))
        .route("/check-email/:email", get(check_email))
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
}

/// Register with email and password
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification code sent", body = PendingVerification),
        (status = 409, description = "Email taken (role-mismatch or already-registered)"),
        (status = 502, description = "Verification code could not be delivered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<Created<PendingVerification>> {
    let outcome = state
        .auth
        .bridge
        .register_with_password(&payload.email, &payload.password, payload.role)
        .await?;
    Ok(Created(PendingVerification::new(outcome.account, outcome.challenge)))
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/auth/sign-in",
    tag = "Authentication",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Email or account not verified, rejected or suspended"),
        (status = 404, description = "No account for this portal"),
        (status = 409, description = "Email belongs to another role")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SignInRequest>,
) -> AppResult<ApiResponse<SessionResponse>> {
    let session = state
        .auth
        .bridge
        .sign_in_with_password(&payload.email, &payload.password, payload.role)
        .await?;
    Ok(ApiResponse::success(session.into()))
}

/// Continue with single sign-on
#[utoipa::path(
    post,
    path = "/auth/sso",
    tag = "Authentication",
    request_body = SsoRequest,
    responses(
        (status = 200, description = "Signed in, or a verification code was sent", body = SsoResponse),
        (status = 404, description = "No account for this portal"),
        (status = 409, description = "Email belongs to another role")
    )
)]
pub async fn sso(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SsoRequest>,
) -> AppResult<ApiResponse<SsoResponse>> {
    let assertion = SsoAssertion {
        provider_id: payload.provider_id,
        id_token: payload.id_token,
    };
    let outcome = state
        .auth
        .bridge
        .continue_with_sso(&assertion, payload.role, payload.intent)
        .await?;
    Ok(ApiResponse::success(outcome.into()))
}

/// Create a portal profile for an SSO identity
#[utoipa::path(
    post,
    path = "/auth/create-profile",
    tag = "Authentication",
    request_body = CreateProfileRequest,
    responses(
        (status = 200, description = "Profile created or existing account resolved", body = SsoResponse),
        (status = 409, description = "Email belongs to another role"),
        (status = 500, description = "Profile could not be created")
    )
)]
pub async fn create_profile(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateProfileRequest>,
) -> AppResult<ApiResponse<SsoResponse>> {
    let assertion = SsoAssertion {
        provider_id: payload.provider_id,
        id_token: payload.id_token,
    };
    let outcome = state
        .auth
        .bridge
        .continue_with_sso(&assertion, payload.role, SsoIntent::Register)
        .await?;
    Ok(ApiResponse::success(outcome.into()))
}

/// Open an employer review session
#[utoipa::path(
    post,
    path = "/auth/review-session",
    tag = "Authentication",
    request_body = ReviewSessionRequest,
    responses(
        (status = 200, description = "Token for the employer document routes", body = ReviewSessionResponse),
        (status = 403, description = "Email not verified or account suspended"),
        (status = 409, description = "Email belongs to another role")
    )
)]
pub async fn review_session(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ReviewSessionRequest>,
) -> AppResult<ApiResponse<ReviewSessionResponse>> {
    let credential = payload.into_credential()?;
    let session = state.auth.bridge.open_review_session(credential).await?;
    Ok(ApiResponse::success(session.into()))
}

/// Check whether an email is registered
#[utoipa::path(
    get,
    path = "/auth/check-email/{email}",
    tag = "Authentication",
    params(
        ("email" = String, Path, description = "Email to check"),
        ("role" = Option<String>, Query, description = "Portal the caller intends to use")
    ),
    responses(
        (status = 200, description = "Registration state", body = EmailCheckResponse),
        (status = 409, description = "Email belongs to another role")
    )
)]
pub async fn check_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Query(query): Query<CheckEmailQuery>,
) -> AppResult<ApiResponse<EmailCheckResponse>> {
    let check = state.auth.bridge.check_email(&email, query.role).await?;
    Ok(ApiResponse::success(check.into()))
}

/// Send a fresh verification code
#[utoipa::path(
    post,
    path = "/auth/send-otp",
    tag = "Authentication",
    request_body = SendOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = IssuedChallenge),
        (status = 429, description = "Resend cooldown active"),
        (status = 502, description = "Code could not be delivered")
    )
)]
pub async fn send_otp(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SendOtpRequest>,
) -> AppResult<ApiResponse<IssuedChallenge>> {
    let challenge = state.auth.otp.resend(&payload.email).await?;
    Ok(ApiResponse::success(challenge))
}

/// Submit a verification code
#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    tag = "Authentication",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Email verified", body = AccountResponse),
        (status = 400, description = "Wrong, expired or used code"),
        (status = 429, description = "Attempt ceiling reached")
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<VerifyOtpRequest>,
) -> AppResult<ApiResponse<AccountResponse>> {
    let account = state.auth.otp.verify(&payload.email, &payload.code).await?;
    Ok(ApiResponse::success(account.into()))
}
