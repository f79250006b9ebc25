//! Unified error handling.
//!
//! One error type crosses every crate boundary. Each variant belongs to one
//! class of the failure taxonomy ([`ErrorKind`]) and carries a stable,
//! machine-readable code that clients route on, a user-facing message and,
//! where there is one, a suggested next step.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DocumentType, DomainError, Role};
use thiserror::Error;

use crate::response::{ApiResponse, ErrorBody};

/// Failure classes clients and callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Role mismatch or duplicate registration; never retried automatically
    Conflict,
    /// Network/storage unavailability; the whole flow may be retried
    Transient,
    /// Bad, expired or exhausted code; a fresh code is needed
    Verification,
    /// Account not allowed in (yet); any external session has been closed
    Authorization,
    /// Malformed input or a disallowed state change
    Invalid,
    /// Bugs and unexpected failures
    Internal,
}

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Conflicts
    #[error("This email is already registered as {existing}")]
    RoleConflict { existing: Role, requested: Role },

    #[error("This email is already registered")]
    AlreadyRegistered { verified: bool },

    #[error("An identity for this email already exists at the identity provider")]
    IdentityExists,

    // Authentication & Authorization
    #[error("No {} account exists for this email", portal_label(.requested))]
    AccountNotFound { requested: Option<Role> },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    EmailNotVerified,

    #[error("Employer account is awaiting verification")]
    AccountNotVerified,

    #[error("Employer verification was rejected")]
    AccountRejected,

    #[error("Employer account is suspended")]
    AccountSuspended,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    // Verification codes
    #[error("Incorrect verification code")]
    InvalidCode { remaining_attempts: u32 },

    #[error("Verification code has expired")]
    CodeExpired,

    #[error("Verification code has already been used")]
    CodeConsumed,

    #[error("Too many incorrect attempts")]
    TooManyAttempts,

    #[error("No verification code has been issued for this email")]
    NoActiveCode,

    #[error("Please wait {retry_after_seconds} seconds before requesting another code")]
    ResendCooldown { retry_after_seconds: i64 },

    // Collaborators
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Account profile could not be created: {0}")]
    ProfileCreationFailed(String),

    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    // Employer review
    #[error("Required documents are not all approved")]
    IncompleteReview { outstanding: Vec<DocumentType> },

    #[error("{0}")]
    InvalidTransition(String),

    #[error("A reason is required")]
    ReasonRequired,

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Validation
    #[error("{0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    BadRequest(String),

    // Rate limiting
    #[error("Too many requests")]
    TooManyRequests,

    // Infrastructure
    #[cfg(feature = "database")]
    #[error("Database error")]
    Database(#[from] sea_orm::DbErr),

    #[cfg(feature = "jwt")]
    #[error("Authentication error")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[cfg(feature = "cache")]
    #[error("Cache error")]
    Cache(#[from] redis::RedisError),

    // Internal
    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Stable error code for clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::RoleConflict { .. } => "role-mismatch",
            AppError::AlreadyRegistered { .. } => "already-registered",
            AppError::IdentityExists => "identity-exists",
            AppError::AccountNotFound { .. } => "account-not-found",
            AppError::InvalidCredentials => "invalid-credentials",
            AppError::EmailNotVerified => "email-not-verified",
            AppError::AccountNotVerified => "account-not-verified",
            AppError::AccountRejected => "account-rejected",
            AppError::AccountSuspended => "account-suspended",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::InvalidCode { .. } => "invalid-code",
            AppError::CodeExpired => "code-expired",
            AppError::CodeConsumed => "code-consumed",
            AppError::TooManyAttempts => "too-many-attempts",
            AppError::NoActiveCode => "no-active-code",
            AppError::ResendCooldown { .. } => "resend-cooldown",
            AppError::DeliveryFailed(_) => "delivery-failed",
            AppError::ProfileCreationFailed(_) => "profile-creation-failed",
            AppError::ProviderUnavailable(_) => "provider-unavailable",
            AppError::IncompleteReview { .. } => "incomplete-review",
            AppError::InvalidTransition(_) => "invalid-transition",
            AppError::ReasonRequired => "reason-required",
            AppError::NotFound => "not-found",
            AppError::Validation(_) => "validation-error",
            AppError::BadRequest(_) => "bad-request",
            AppError::TooManyRequests => "too-many-requests",
            #[cfg(feature = "database")]
            AppError::Database(_) => "database-error",
            #[cfg(feature = "jwt")]
            AppError::Jwt(_) => "invalid-token",
            #[cfg(feature = "cache")]
            AppError::Cache(_) => "cache-error",
            AppError::Internal(_) => "internal-error",
        }
    }

    /// Taxonomy class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::RoleConflict { .. }
            | AppError::AlreadyRegistered { .. }
            | AppError::IdentityExists => ErrorKind::Conflict,

            AppError::DeliveryFailed(_)
            | AppError::ProviderUnavailable(_)
            | AppError::TooManyRequests => ErrorKind::Transient,
            #[cfg(feature = "database")]
            AppError::Database(_) => ErrorKind::Transient,
            #[cfg(feature = "cache")]
            AppError::Cache(_) => ErrorKind::Transient,

            AppError::InvalidCode { .. }
            | AppError::CodeExpired
            | AppError::CodeConsumed
            | AppError::TooManyAttempts
            | AppError::NoActiveCode
            | AppError::ResendCooldown { .. } => ErrorKind::Verification,

            AppError::AccountNotFound { .. }
            | AppError::InvalidCredentials
            | AppError::EmailNotVerified
            | AppError::AccountNotVerified
            | AppError::AccountRejected
            | AppError::AccountSuspended
            | AppError::Unauthorized
            | AppError::Forbidden => ErrorKind::Authorization,
            #[cfg(feature = "jwt")]
            AppError::Jwt(_) => ErrorKind::Authorization,

            AppError::IncompleteReview { .. }
            | AppError::InvalidTransition(_)
            | AppError::ReasonRequired
            | AppError::NotFound
            | AppError::Validation(_)
            | AppError::BadRequest(_) => ErrorKind::Invalid,

            AppError::ProfileCreationFailed(_) | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Safe to retry the whole flow from the top
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Get HTTP status code
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RoleConflict { .. }
            | AppError::AlreadyRegistered { .. }
            | AppError::IdentityExists
            | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            #[cfg(feature = "jwt")]
            AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::EmailNotVerified
            | AppError::AccountNotVerified
            | AppError::AccountRejected
            | AppError::AccountSuspended
            | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::AccountNotFound { .. } | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidCode { .. }
            | AppError::CodeConsumed
            | AppError::NoActiveCode
            | AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::ReasonRequired => StatusCode::BAD_REQUEST,
            AppError::CodeExpired => StatusCode::GONE,
            AppError::IncompleteReview { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TooManyAttempts
            | AppError::ResendCooldown { .. }
            | AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::DeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Suggested next step for the user, if one applies
    pub fn action(&self) -> Option<&'static str> {
        match self {
            AppError::RoleConflict { .. } => Some("sign-in"),
            AppError::AlreadyRegistered { verified: true } => Some("sign-in"),
            AppError::AlreadyRegistered { verified: false } => Some("resend-verification"),
            AppError::IdentityExists => Some("reset-password"),
            AppError::AccountNotFound { .. } => Some("register"),
            AppError::InvalidCredentials => Some("reset-password"),
            AppError::EmailNotVerified
            | AppError::InvalidCode { .. }
            | AppError::CodeExpired
            | AppError::CodeConsumed
            | AppError::TooManyAttempts
            | AppError::NoActiveCode => Some("resend-verification"),
            AppError::AccountNotVerified => Some("upload-documents"),
            AppError::AccountRejected => Some("upload-documents"),
            AppError::AccountSuspended => Some("contact-support"),
            AppError::IncompleteReview { .. } => Some("review-documents"),
            AppError::DeliveryFailed(_)
            | AppError::ProviderUnavailable(_)
            | AppError::ProfileCreationFailed(_)
            | AppError::ResendCooldown { .. }
            | AppError::TooManyRequests => Some("retry"),
            _ => None,
        }
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::RoleConflict { existing, .. } => format!(
                "This email is already registered as {}. Please sign in through the {} portal.",
                article(*existing),
                existing
            ),
            AppError::AccountNotFound {
                requested: Some(role),
            } => format!(
                "No {} account exists for this email. Please register first.",
                role
            ),
            AppError::AccountNotFound { requested: None } => {
                "No account exists for this email".to_string()
            }
            AppError::InvalidCode { remaining_attempts } => format!(
                "Incorrect verification code. {} attempt(s) remaining.",
                remaining_attempts
            ),
            AppError::IncompleteReview { outstanding } => {
                let names: Vec<&str> = outstanding.iter().map(|d| d.as_str()).collect();
                format!(
                    "Every required document must be approved first (outstanding: {})",
                    names.join(", ")
                )
            }
            AppError::Validation(msg) | AppError::BadRequest(msg) => msg.clone(),
            AppError::InvalidTransition(msg) => msg.clone(),

            // Hide details for internal/collaborator errors
            AppError::DeliveryFailed(detail) => {
                tracing::warn!("Notification delivery failed: {}", detail);
                "We could not send the email. Please try again.".to_string()
            }
            AppError::ProfileCreationFailed(detail) => {
                tracing::error!("Profile creation failed: {}", detail);
                "Your account could not be created. Please try again.".to_string()
            }
            AppError::ProviderUnavailable(detail) => {
                tracing::error!("Identity provider unavailable: {}", detail);
                "Sign-in is temporarily unavailable. Please try again.".to_string()
            }
            #[cfg(feature = "database")]
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            #[cfg(feature = "jwt")]
            AppError::Jwt(e) => {
                tracing::debug!("JWT error: {:?}", e);
                "Invalid or expired token".to_string()
            }
            #[cfg(feature = "cache")]
            AppError::Cache(e) => {
                tracing::error!("Cache error: {:?}", e);
                "A cache error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }
}

fn portal_label(requested: &Option<Role>) -> &'static str {
    requested.map(|role| role.as_str()).unwrap_or("portal")
}

fn article(role: Role) -> String {
    match role {
        Role::Admin => format!("an {}", role),
        _ => format!("a {}", role),
    }
}

// =============================================================================
// HTTP Response (Axum)
// =============================================================================

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::<()>::failure(ErrorBody {
            code: self.code().to_string(),
            message: self.user_message(),
            action: self.action().map(str::to_string),
        });

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Domain Error Conversion
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::NotFound(_) => AppError::NotFound,
            err @ DomainError::InvalidTransition { .. } => {
                AppError::InvalidTransition(err.to_string())
            }
            DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Convenience constructors
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn delivery_failed(detail: impl Into<String>) -> Self {
        AppError::DeliveryFailed(detail.into())
    }

    pub fn provider_unavailable(detail: impl Into<String>) -> Self {
        AppError::ProviderUnavailable(detail.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_never_transient() {
        let err = AppError::RoleConflict {
            existing: Role::JobSeeker,
            requested: Role::Employer,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_transient());
        assert_eq!(err.code(), "role-mismatch");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn role_conflict_message_names_the_registered_role() {
        let err = AppError::RoleConflict {
            existing: Role::Admin,
            requested: Role::Employer,
        };
        assert!(err.user_message().contains("an admin"));
    }

    #[test]
    fn already_registered_suggests_next_step_by_verification() {
        assert_eq!(
            AppError::AlreadyRegistered { verified: false }.action(),
            Some("resend-verification")
        );
        assert_eq!(
            AppError::AlreadyRegistered { verified: true }.action(),
            Some("sign-in")
        );
    }

    #[test]
    fn employer_gate_errors_are_authorization_failures() {
        for err in [
            AppError::AccountNotVerified,
            AppError::AccountRejected,
            AppError::AccountSuspended,
            AppError::EmailNotVerified,
        ] {
            assert_eq!(err.kind(), ErrorKind::Authorization);
            assert_eq!(err.status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn account_not_found_names_the_requested_portal() {
        let employer = AppError::AccountNotFound {
            requested: Some(Role::Employer),
        };
        assert_eq!(employer.to_string(), "No employer account exists for this email");

        let any = AppError::AccountNotFound { requested: None };
        assert_eq!(any.to_string(), "No portal account exists for this email");
        assert_eq!(any.code(), "account-not-found");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = AppError::internal("connection string leaked");
        assert!(!err.user_message().contains("leaked"));
    }

    #[test]
    fn invalid_transition_maps_from_domain() {
        let err: AppError = DomainError::invalid_transition("verified", "approve").into();
        assert_eq!(err.code(), "invalid-transition");
        assert_eq!(err.user_message(), "Cannot approve when status is verified");
    }
}
