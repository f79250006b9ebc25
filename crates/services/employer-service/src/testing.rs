//! In-memory document store and a wired employer review fixture.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use common::notify::RecordingNotifier;
use common::{AppError, AppResult};
use domain::{
    AccountStatus, CredentialKind, Decision, DocumentType, EmployerVerificationCase, NewAccount,
    ReviewStatus, Role, REQUIRED_DOCUMENT_TYPES,
};
use registry_service_lib::service::IdentityRegistry;
use registry_service_lib::testing::InMemoryStores;

use crate::service::{
    AdminDecisions, CaseWorkflow, DecisionDesk, EmployerVerification, UploadDocument,
};
use crate::store::{DocumentMetadata, DocumentStore};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn store(&self, bytes: Vec<u8>, metadata: &DocumentMetadata) -> AppResult<String> {
        let storage_ref = format!("{}/{}", metadata.document_type, Uuid::new_v4());
        self.blobs.lock().unwrap().insert(storage_ref.clone(), bytes);
        Ok(storage_ref)
    }

    async fn fetch(&self, storage_ref: &str) -> AppResult<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(storage_ref)
            .cloned()
            .ok_or(AppError::NotFound)
    }
}

/// A small PDF-typed upload of the given type.
pub fn upload(document_type: DocumentType) -> UploadDocument {
    UploadDocument {
        document_type,
        file_name: format!("{}.pdf", document_type),
        content_type: "application/pdf".to_string(),
        bytes: format!("%PDF {}", document_type).into_bytes(),
    }
}

/// Review services over in-memory storage with one verified employer and
/// one job seeker already registered.
pub struct EmployerFixture {
    pub stores: InMemoryStores,
    pub registry: Arc<dyn IdentityRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub workflow: CaseWorkflow,
    pub desk: DecisionDesk,
    pub max_bytes: usize,
}

impl EmployerFixture {
    pub const EMAIL: &'static str = "hr@acme.com";
    pub const SEEKER: &'static str = "seeker@x.com";
    const REVIEWER: &'static str = "admin@portal.com";

    pub async fn new() -> Self {
        let stores = InMemoryStores::new();
        let registry: Arc<dyn IdentityRegistry> = stores.registry();
        let notifier = Arc::new(RecordingNotifier::new());
        let documents = Arc::new(InMemoryDocumentStore::new());
        let max_bytes = 1024;

        let workflow = CaseWorkflow::new(
            registry.clone(),
            stores.cases.clone(),
            documents.clone(),
            max_bytes,
        );
        let desk = DecisionDesk::new(registry.clone(), stores.cases.clone(), notifier.clone());

        let fixture = Self {
            stores,
            registry,
            notifier,
            documents,
            workflow,
            desk,
            max_bytes,
        };
        fixture.register_employer(Self::EMAIL, true).await;
        let seeker = NewAccount::new(Self::SEEKER, Role::JobSeeker, CredentialKind::Password)
            .unwrap()
            .verified();
        fixture.registry.create_account(seeker).await.unwrap();
        fixture
    }

    pub async fn register_employer(&self, email: &str, verified: bool) {
        let mut account = NewAccount::new(email, Role::Employer, CredentialKind::Password).unwrap();
        if verified {
            account = account.verified();
        }
        self.registry.create_account(account).await.unwrap();
    }

    pub async fn account_status(&self) -> AccountStatus {
        self.registry.lookup(Self::EMAIL).await.unwrap().account_status
    }

    /// Upload every required type so the case is pending.
    pub async fn pending_case(&self) -> EmployerVerificationCase {
        let mut case = None;
        for ty in REQUIRED_DOCUMENT_TYPES {
            case = Some(
                self.workflow
                    .upload_document(Self::EMAIL, upload(ty))
                    .await
                    .unwrap(),
            );
        }
        case.unwrap()
    }

    pub async fn approved_case(&self) -> EmployerVerificationCase {
        let case = self.pending_case().await;
        for doc in case.current_documents() {
            self.desk
                .review_document(case.id, doc.id, ReviewStatus::Approved, None, Self::REVIEWER)
                .await
                .unwrap();
        }
        self.desk
            .decide(case.id, Decision::Approve, None, Self::REVIEWER)
            .await
            .unwrap()
    }

    /// A rejected case where only `approved` types passed review.
    pub async fn rejected_case(&self, approved: &[DocumentType]) -> EmployerVerificationCase {
        let case = self.pending_case().await;
        for doc in case.current_documents() {
            let status = if approved.contains(&doc.document_type) {
                ReviewStatus::Approved
            } else {
                ReviewStatus::Rejected
            };
            self.desk
                .review_document(case.id, doc.id, status, None, Self::REVIEWER)
                .await
                .unwrap();
        }
        self.desk
            .decide(
                case.id,
                Decision::Reject,
                Some("Documents unreadable".into()),
                Self::REVIEWER,
            )
            .await
            .unwrap();
        self.workflow.get_case(case.id).await.unwrap()
    }
}
