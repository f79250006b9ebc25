//! Administrator review handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use common::{ApiResponse, AppResult};
use domain::{AccountStatus, Decision, EmployerVerificationCase, ReviewStatus};

use crate::extractors::ValidatedJson;
use crate::middleware::{require_admin, CurrentUser};
use crate::state::AppState;

/// Review of a single document entry
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReviewDocumentRequest {
    pub status: ReviewStatus,
    #[validate(length(max = 2000, message = "Note is too long"))]
    pub note: Option<String>,
}

/// Decision on a whole case
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DecisionRequest {
    pub decision: Decision,
    /// Required when rejecting
    #[validate(length(max = 2000, message = "Reason is too long"))]
    pub reason: Option<String>,
}

/// Suspension of an employer
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SuspendRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, max = 2000, message = "A reason is required"))]
    pub reason: String,
}

/// Lifting of a suspension
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReinstateRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 2000, message = "Reason is too long"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CaseListQuery {
    pub status: Option<AccountStatus>,
}

/// Create admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/employers/cases", get(list_cases))
        .route("/employers/suspend", post(suspend))
        .route("/employers/reinstate", post(reinstate))
        .route("/employers/:id", get(get_case))
        .route("/employers/:id/documents/:doc", get(download_document))
        .route("/employers/:id/documents/:doc/review", post(review_document))
        .route("/employers/:id/decision", post(decide))
}

/// Review queue
#[utoipa::path(
    get,
    path = "/admin/employers/cases",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("status" = Option<String>, Query, description = "Filter by case status")),
    responses(
        (status = 200, description = "Cases, newest first", body = Vec<EmployerVerificationCase>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn list_cases(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Query(query): Query<CaseListQuery>,
) -> AppResult<ApiResponse<Vec<EmployerVerificationCase>>> {
    require_admin(&current_user)?;
    let cases = state.employers.verification.list_cases(query.status).await?;
    Ok(ApiResponse::success(cases))
}

/// Case detail
#[utoipa::path(
    get,
    path = "/admin/employers/{id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Case ID")),
    responses(
        (status = 200, description = "Case with its documents", body = EmployerVerificationCase),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Case not found")
    )
)]
pub async fn get_case(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<ApiResponse<EmployerVerificationCase>> {
    require_admin(&current_user)?;
    let case = state.employers.verification.get_case(id).await?;
    Ok(ApiResponse::success(case))
}

/// Download an uploaded document
#[utoipa::path(
    get,
    path = "/admin/employers/{id}/documents/{doc}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Case ID"),
        ("doc" = Uuid, Path, description = "Document entry ID")
    ),
    responses(
        (status = 200, description = "Document bytes"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Document not found")
    )
)]
pub async fn download_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path((id, doc)): Path<(Uuid, Uuid)>,
) -> AppResult<Response> {
    require_admin(&current_user)?;
    let (document, bytes) = state.employers.verification.fetch_document(id, doc).await?;
    let disposition = format!(
        "inline; filename=\"{}\"",
        document.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );
    Ok(([(CONTENT_TYPE, document.content_type), (CONTENT_DISPOSITION, disposition)], bytes).into_response())
}

/// Review one document entry
#[utoipa::path(
    post,
    path = "/admin/employers/{id}/documents/{doc}/review",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Case ID"),
        ("doc" = Uuid, Path, description = "Document entry ID")
    ),
    request_body = ReviewDocumentRequest,
    responses(
        (status = 200, description = "Updated case", body = EmployerVerificationCase),
        (status = 409, description = "Case already decided or entry superseded")
    )
)]
pub async fn review_document(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path((id, doc)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<ReviewDocumentRequest>,
) -> AppResult<ApiResponse<EmployerVerificationCase>> {
    require_admin(&current_user)?;
    let case = state
        .employers
        .decisions
        .review_document(id, doc, payload.status, payload.note, &current_user.email)
        .await?;
    Ok(ApiResponse::success(case))
}

/// Approve or reject a case
#[utoipa::path(
    post,
    path = "/admin/employers/{id}/decision",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Case ID")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decided case", body = EmployerVerificationCase),
        (status = 400, description = "Rejection without a reason"),
        (status = 409, description = "Case is not pending"),
        (status = 422, description = "Required documents not approved")
    )
)]
pub async fn decide(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<DecisionRequest>,
) -> AppResult<ApiResponse<EmployerVerificationCase>> {
    require_admin(&current_user)?;
    let case = state
        .employers
        .decisions
        .decide(id, payload.decision, payload.reason, &current_user.email)
        .await?;
    Ok(ApiResponse::success(case))
}

/// Suspend an employer
#[utoipa::path(
    post,
    path = "/admin/employers/suspend",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = SuspendRequest,
    responses(
        (status = 200, description = "Suspended", body = EmployerVerificationCase),
        (status = 409, description = "Employer cannot be suspended from its current status")
    )
)]
pub async fn suspend(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SuspendRequest>,
) -> AppResult<ApiResponse<EmployerVerificationCase>> {
    require_admin(&current_user)?;
    let case = state
        .employers
        .decisions
        .suspend(&payload.email, payload.reason, &current_user.email)
        .await?;
    Ok(ApiResponse::success(case))
}

/// Reinstate a suspended employer
#[utoipa::path(
    post,
    path = "/admin/employers/reinstate",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = ReinstateRequest,
    responses(
        (status = 200, description = "Reinstated", body = EmployerVerificationCase),
        (status = 409, description = "Employer is not suspended")
    )
)]
pub async fn reinstate(
    Extension(current_user): Extension<CurrentUser>,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ReinstateRequest>,
) -> AppResult<ApiResponse<EmployerVerificationCase>> {
    require_admin(&current_user)?;
    let case = state
        .employers
        .decisions
        .reinstate(&payload.email, payload.reason, &current_user.email)
        .await?;
    Ok(ApiResponse::success(case))
}
