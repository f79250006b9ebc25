//! OpenAPI documentation.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::handlers::admin_handler::{
    DecisionRequest, ReinstateRequest, ReviewDocumentRequest, SuspendRequest,
};
use crate::handlers::auth_handler::{
    CreateProfileRequest, EmailCheckResponse, PendingVerification, RegisterRequest,
    ReviewSessionRequest, ReviewSessionResponse, SendOtpRequest, SessionResponse, SignInRequest,
    SsoRequest, SsoResponse, VerifyOtpRequest,
};
use crate::handlers::employer_handler::{DocumentUploadForm, EmployerStatusResponse};
use domain::{
    AccountResponse, AccountStatus, Decision, DocumentType, EmployerVerificationCase,
    IssuedChallenge, ReviewStatus, Role, VerificationDocument,
};

/// API documentation struct.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth_handler::register,
        crate::handlers::auth_handler::sign_in,
        crate::handlers::auth_handler::sso,
        crate::handlers::auth_handler::create_profile,
        crate::handlers::auth_handler::review_session,
        crate::handlers::auth_handler::check_email,
        crate::handlers::auth_handler::send_otp,
        crate::handlers::auth_handler::verify_otp,
        crate::handlers::employer_handler::account_status,
        crate::handlers::employer_handler::upload_document,
        crate::handlers::employer_handler::list_own_cases,
        crate::handlers::admin_handler::list_cases,
        crate::handlers::admin_handler::get_case,
        crate::handlers::admin_handler::download_document,
        crate::handlers::admin_handler::review_document,
        crate::handlers::admin_handler::decide,
        crate::handlers::admin_handler::suspend,
        crate::handlers::admin_handler::reinstate,
    ),
    components(
        schemas(
            RegisterRequest,
            SignInRequest,
            SsoRequest,
            CreateProfileRequest,
            ReviewSessionRequest,
            ReviewSessionResponse,
            SendOtpRequest,
            VerifyOtpRequest,
            SessionResponse,
            PendingVerification,
            SsoResponse,
            EmailCheckResponse,
            EmployerStatusResponse,
            DocumentUploadForm,
            ReviewDocumentRequest,
            DecisionRequest,
            SuspendRequest,
            ReinstateRequest,
            AccountResponse,
            AccountStatus,
            Role,
            IssuedChallenge,
            DocumentType,
            ReviewStatus,
            Decision,
            VerificationDocument,
            EmployerVerificationCase,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, sign-in and email verification"),
        (name = "Employers", description = "Employer document submission"),
        (name = "Admin", description = "Employer review and decisions"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
