//! Employer Verification State Machine.
//!
//! Document uploads drive a case from `none` to `pending`. Nothing here moves
//! a case out of `pending`; that is the decision desk's job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{
    AccountStatus, CaseEvent, DocumentType, EmployerVerificationCase, NewDocument,
    VerificationDocument, ACCEPTED_DOCUMENT_TYPES, REQUIRED_DOCUMENT_TYPES,
};
use registry_service_lib::repository::CaseRepository;
use registry_service_lib::service::IdentityRegistry;

use super::employer_account;
use crate::store::{DocumentMetadata, DocumentStore};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// A document as received from the employer.
#[derive(Debug, Clone)]
pub struct UploadDocument {
    pub document_type: DocumentType,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Answer of the status-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployerStatus {
    pub email: String,
    pub email_verified: bool,
    pub account_status: AccountStatus,
    pub active_case: Option<EmployerVerificationCase>,
    /// Required types the active case still lacks
    pub missing_documents: Vec<DocumentType>,
}

/// Employer-facing review operations.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait EmployerVerification: Send + Sync {
    /// Add a document to the active case, opening one if needed.
    async fn upload_document(&self, email: &str, upload: UploadDocument) -> AppResult<EmployerVerificationCase>;

    /// Current review state of an employer. Safe to poll.
    async fn status(&self, email: &str) -> AppResult<EmployerStatus>;

    async fn get_case(&self, case_id: Uuid) -> AppResult<EmployerVerificationCase>;

    /// All cases of an employer, oldest first
    async fn history(&self, email: &str) -> AppResult<Vec<EmployerVerificationCase>>;

    /// Cases for the admin queue, newest first
    async fn list_cases(&self, status: Option<AccountStatus>) -> AppResult<Vec<EmployerVerificationCase>>;

    /// A document entry of a case together with its bytes
    async fn fetch_document(
        &self,
        case_id: Uuid,
        document_id: Uuid,
    ) -> AppResult<(VerificationDocument, Vec<u8>)>;
}

/// Repository-backed state machine
pub struct CaseWorkflow {
    registry: Arc<dyn IdentityRegistry>,
    cases: Arc<dyn CaseRepository>,
    documents: Arc<dyn DocumentStore>,
    max_document_bytes: usize,
}

impl CaseWorkflow {
    pub fn new(
        registry: Arc<dyn IdentityRegistry>,
        cases: Arc<dyn CaseRepository>,
        documents: Arc<dyn DocumentStore>,
        max_document_bytes: usize,
    ) -> Self {
        Self {
            registry,
            cases,
            documents,
            max_document_bytes,
        }
    }

    fn check_upload(&self, upload: &UploadDocument) -> AppResult<()> {
        if upload.bytes.is_empty() {
            return Err(AppError::validation("Document is empty"));
        }
        if upload.bytes.len() > self.max_document_bytes {
            return Err(AppError::validation(format!(
                "Document exceeds {} bytes",
                self.max_document_bytes
            )));
        }
        if !ACCEPTED_DOCUMENT_TYPES.contains(&upload.content_type.as_str()) {
            return Err(AppError::validation(format!(
                "Unsupported content type '{}'",
                upload.content_type
            )));
        }
        if upload.file_name.trim().is_empty() {
            return Err(AppError::validation("File name is required"));
        }
        Ok(())
    }

    /// The case an upload goes into. A rejected case is left untouched and
    /// a resubmission case is opened after it.
    async fn writable_case(&self, account_id: Uuid, email: &str) -> AppResult<EmployerVerificationCase> {
        let now = Utc::now();
        let opened = match self.cases.find_active(account_id).await? {
            Some(case) if case.is_open() => return Ok(case),
            Some(case) if case.status == AccountStatus::Rejected => {
                EmployerVerificationCase::resubmission_of(&case, now)?
            }
            Some(case) => {
                return Err(AppError::InvalidTransition(format!(
                    "Documents cannot be uploaded while the account is {}",
                    case.status
                )))
            }
            None => EmployerVerificationCase::open(account_id, email, now),
        };

        if self.cases.create(opened.clone()).await? {
            info!(
                case_id = %opened.id,
                email = %email,
                previous_case_id = ?opened.previous_case_id,
                carried = opened.documents.len(),
                "Verification case opened"
            );
            return Ok(opened);
        }

        // A concurrent upload opened the case first
        match self.cases.find_active(account_id).await? {
            Some(case) if case.is_open() => Ok(case),
            _ => Err(AppError::InvalidTransition(
                "Verification case changed during upload".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EmployerVerification for CaseWorkflow {
    async fn upload_document(&self, email: &str, upload: UploadDocument) -> AppResult<EmployerVerificationCase> {
        let account = employer_account(self.registry.as_ref(), email).await?;
        if !account.email_verified {
            return Err(AppError::EmailNotVerified);
        }
        self.check_upload(&upload)?;

        let mut case = self.writable_case(account.id, &account.email).await?;

        let metadata = DocumentMetadata {
            owner: account.email.clone(),
            document_type: upload.document_type,
            file_name: upload.file_name.trim().to_string(),
            content_type: upload.content_type.clone(),
        };
        let storage_ref = self.documents.store(upload.bytes, &metadata).await?;

        let now = Utc::now();
        let entry = case.new_entry(
            NewDocument {
                document_type: metadata.document_type,
                storage_ref,
                file_name: metadata.file_name,
                content_type: metadata.content_type,
            },
            now,
        );
        self.cases.append_document(entry.clone()).await?;
        case.documents.push(entry);
        info!(
            case_id = %case.id,
            document_type = %upload.document_type,
            "Verification document uploaded"
        );

        if case.status == AccountStatus::None && case.has_all_required() {
            let from = case.status;
            let status = case.apply(CaseEvent::DocumentsComplete, now)?;
            self.registry
                .set_account_status(&account.email, account.account_status, status, None)
                .await?;
            if self.cases.transition(&case, from).await? {
                info!(case_id = %case.id, email = %account.email, "Case submitted for review");
            } else if let Some(current) = self.cases.find_by_id(case.id).await? {
                // Submitted by a concurrent upload
                case = current;
            }
        }

        Ok(case)
    }

    async fn status(&self, email: &str) -> AppResult<EmployerStatus> {
        let account = employer_account(self.registry.as_ref(), email).await?;
        let active_case = self.cases.find_active(account.id).await?;
        let missing_documents = match &active_case {
            Some(case) if case.status != AccountStatus::Rejected => case.missing_required_types(),
            _ => REQUIRED_DOCUMENT_TYPES.to_vec(),
        };

        Ok(EmployerStatus {
            email: account.email,
            email_verified: account.email_verified,
            account_status: account.account_status,
            active_case,
            missing_documents,
        })
    }

    async fn get_case(&self, case_id: Uuid) -> AppResult<EmployerVerificationCase> {
        self.cases.find_by_id(case_id).await?.ok_or(AppError::NotFound)
    }

    async fn history(&self, email: &str) -> AppResult<Vec<EmployerVerificationCase>> {
        let account = employer_account(self.registry.as_ref(), email).await?;
        self.cases.history(account.id).await
    }

    async fn list_cases(&self, status: Option<AccountStatus>) -> AppResult<Vec<EmployerVerificationCase>> {
        self.cases.list(status).await
    }

    async fn fetch_document(
        &self,
        case_id: Uuid,
        document_id: Uuid,
    ) -> AppResult<(VerificationDocument, Vec<u8>)> {
        let case = self.get_case(case_id).await?;
        let document = case
            .documents
            .into_iter()
            .find(|d| d.id == document_id)
            .ok_or(AppError::NotFound)?;
        let bytes = self.documents.fetch(&document.storage_ref).await?;
        Ok((document, bytes))
    }
}
