//! Employer self-service handlers.

use axum::{
    extract::{DefaultBodyLimit, Extension, Multipart, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;

use common::{ApiResponse, AppError, AppResult, Created};
use domain::{AccountStatus, DocumentType, EmployerVerificationCase, MAX_DOCUMENT_BYTES};
use employer_service_lib::service::{EmployerStatus, UploadDocument};

use crate::middleware::{require_employer, CurrentUser};
use crate::state::AppState;

/// Room for multipart boundaries and the text fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Review state of the signed-in employer
#[derive(Debug, Serialize, ToSchema)]
pub struct EmployerStatusResponse {
    pub email: String,
    pub email_verified: bool,
    pub account_status: AccountStatus,
    pub active_case: Option<EmployerVerificationCase>,
    /// Required document types still to upload
    pub missing_documents: Vec<DocumentType>,
}

impl From<EmployerStatus> for EmployerStatusResponse {
    fn from(status: EmployerStatus) -> Self {
        Self {
            email: status.email,
            email_verified: status.email_verified,
            account_status: status.account_status,
            active_case: status.active_case,
            missing_documents: status.missing_documents,
        }
    }
}

/// Multipart form of a document upload, for the docs only
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct DocumentUploadForm {
    #[schema(example = "business_registration")]
    document_type: String,
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Create employer routes
pub fn employer_routes() -> Router<AppState> {
    Router::new()
        .route("/account-status", get(account_status))
        .route(
            "/documents",
            post(upload_document)
                .layer(DefaultBodyLimit::max(MAX_DOCUMENT_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/cases", get(list_own_cases))
}

/// Current verification status
#[utoipa::path(
    get,
    path = "/employers/account-status",
    tag = "Employers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Verification status", body = EmployerStatusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not an employer")
    )
)]
pub async fn account_status(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<EmployerStatusResponse>> {
    let account = require_employer(&state, &current_user).await?;
    let status = state.employers.verification.status(&account.email).await?;
    Ok(ApiResponse::success(status.into()))
}

/// Upload a verification document
#[utoipa::path(
    post,
    path = "/employers/documents",
    tag = "Employers",
    security(("bearer_auth" = [])),
    request_body(content = DocumentUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Document added to the active case", body = EmployerVerificationCase),
        (status = 400, description = "Missing, empty, oversized or unsupported file"),
        (status = 403, description = "Email not verified or not an employer"),
        (status = 409, description = "Account is not accepting documents")
    )
)]
pub async fn upload_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Created<EmployerVerificationCase>> {
    let account = require_employer(&state, &current_user).await?;
    let upload = read_upload(multipart).await?;
    let case = state
        .employers
        .verification
        .upload_document(&account.email, upload)
        .await?;
    Ok(Created(case))
}

/// All review rounds of the signed-in employer
#[utoipa::path(
    get,
    path = "/employers/cases",
    tag = "Employers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cases, oldest first", body = Vec<EmployerVerificationCase>),
        (status = 403, description = "Not an employer")
    )
)]
pub async fn list_own_cases(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<EmployerVerificationCase>>> {
    let account = require_employer(&state, &current_user).await?;
    let cases = state.employers.verification.history(&account.email).await?;
    Ok(ApiResponse::success(cases))
}

async fn read_upload(mut multipart: Multipart) -> AppResult<UploadDocument> {
    let mut document_type: Option<DocumentType> = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("document_type") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                document_type = Some(value.trim().parse()?);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let document_type = document_type.ok_or_else(|| AppError::validation("document_type is required"))?;
    let (file_name, content_type, bytes) = file.ok_or_else(|| AppError::validation("file is required"))?;

    Ok(UploadDocument {
        document_type,
        file_name,
        content_type,
        bytes,
    })
}
