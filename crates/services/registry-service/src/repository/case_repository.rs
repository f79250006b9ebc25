//! Employer case repository.
//!
//! A case row plus its document rows. Documents are only ever inserted, and
//! afterwards only their review columns change.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{corrupt_row, is_unique_violation};
use super::entities::employer_case::{self, Entity as CaseEntity};
use super::entities::verification_document::{self, Entity as DocumentEntity};
use common::{AppError, AppResult};
use domain::{AccountStatus, EmployerVerificationCase, VerificationDocument};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CaseRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EmployerVerificationCase>>;

    /// The newest case of an account; the only one that may still advance
    async fn find_active(&self, account_id: Uuid) -> AppResult<Option<EmployerVerificationCase>>;

    /// Every case of an account, oldest first
    async fn history(&self, account_id: Uuid) -> AppResult<Vec<EmployerVerificationCase>>;

    /// Cases newest first, optionally filtered by status
    async fn list(&self, status: Option<AccountStatus>) -> AppResult<Vec<EmployerVerificationCase>>;

    /// Insert a case together with the entries it starts with.
    ///
    /// Returns `false`, writing nothing, when the account already has an
    /// undecided case.
    async fn create(&self, case: EmployerVerificationCase) -> AppResult<bool>;

    /// Append one document entry
    async fn append_document(&self, document: VerificationDocument) -> AppResult<()>;

    /// Persist the review columns of an entry
    async fn update_review(&self, document: VerificationDocument) -> AppResult<()>;

    /// Persist the status and decision columns of a case still in `from`.
    ///
    /// Returns `false` when the stored status has moved on.
    async fn transition(&self, case: &EmployerVerificationCase, from: AccountStatus) -> AppResult<bool>;

    /// Record when the decision notice went out
    async fn mark_notified(&self, case_id: Uuid, at: DateTime<Utc>) -> AppResult<()>;
}

/// SeaORM-backed case repository
pub struct CaseStore {
    db: Arc<DatabaseConnection>,
}

impl CaseStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Load the documents of the given cases and assemble domain values.
    async fn assemble(
        &self,
        cases: Vec<employer_case::Model>,
    ) -> AppResult<Vec<EmployerVerificationCase>> {
        if cases.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = cases.iter().map(|c| c.id).collect();
        let mut documents: HashMap<Uuid, Vec<VerificationDocument>> = HashMap::new();
        for model in DocumentEntity::find()
            .filter(verification_document::Column::CaseId.is_in(ids))
            .order_by_asc(verification_document::Column::Position)
            .all(self.db.as_ref())
            .await?
        {
            let document = VerificationDocument::try_from(model)
                .map_err(|e| corrupt_row("verification_documents", e))?;
            documents.entry(document.case_id).or_default().push(document);
        }

        cases
            .into_iter()
            .map(|model| {
                let docs = documents.remove(&model.id).unwrap_or_default();
                case_from_model(model, docs)
            })
            .collect()
    }

    async fn assemble_one(
        &self,
        model: Option<employer_case::Model>,
    ) -> AppResult<Option<EmployerVerificationCase>> {
        match model {
            Some(model) => Ok(self.assemble(vec![model]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn case_from_model(
    model: employer_case::Model,
    documents: Vec<VerificationDocument>,
) -> AppResult<EmployerVerificationCase> {
    let status = model
        .status
        .parse()
        .map_err(|e| corrupt_row("employer_cases", e))?;

    Ok(EmployerVerificationCase {
        id: model.id,
        account_id: model.account_id,
        email: model.email,
        status,
        documents,
        decided_by: model.decided_by,
        decided_at: model.decided_at,
        decision_reason: model.decision_reason,
        notified_at: model.notified_at,
        previous_case_id: model.previous_case_id,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn case_active_model(case: &EmployerVerificationCase) -> employer_case::ActiveModel {
    employer_case::ActiveModel {
        id: Set(case.id),
        account_id: Set(case.account_id),
        email: Set(case.email.clone()),
        status: Set(case.status.as_str().to_string()),
        decided_by: Set(case.decided_by.clone()),
        decided_at: Set(case.decided_at),
        decision_reason: Set(case.decision_reason.clone()),
        notified_at: Set(case.notified_at),
        previous_case_id: Set(case.previous_case_id),
        created_at: Set(case.created_at),
        updated_at: Set(case.updated_at),
    }
}

fn document_active_model(doc: VerificationDocument) -> verification_document::ActiveModel {
    verification_document::ActiveModel {
        id: Set(doc.id),
        case_id: Set(doc.case_id),
        position: Set(doc.position),
        document_type: Set(doc.document_type.as_str().to_string()),
        storage_ref: Set(doc.storage_ref),
        file_name: Set(doc.file_name),
        content_type: Set(doc.content_type),
        uploaded_at: Set(doc.uploaded_at),
        review_status: Set(doc.review_status.as_str().to_string()),
        reviewer_note: Set(doc.reviewer_note),
        reviewed_by: Set(doc.reviewed_by),
        reviewed_at: Set(doc.reviewed_at),
    }
}

#[async_trait]
impl CaseRepository for CaseStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<EmployerVerificationCase>> {
        let model = CaseEntity::find_by_id(id).one(self.db.as_ref()).await?;
        self.assemble_one(model).await
    }

    async fn find_active(&self, account_id: Uuid) -> AppResult<Option<EmployerVerificationCase>> {
        let model = CaseEntity::find()
            .filter(employer_case::Column::AccountId.eq(account_id))
            .order_by_desc(employer_case::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?;
        self.assemble_one(model).await
    }

    async fn history(&self, account_id: Uuid) -> AppResult<Vec<EmployerVerificationCase>> {
        let models = CaseEntity::find()
            .filter(employer_case::Column::AccountId.eq(account_id))
            .order_by_asc(employer_case::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        self.assemble(models).await
    }

    async fn list(&self, status: Option<AccountStatus>) -> AppResult<Vec<EmployerVerificationCase>> {
        let mut query = CaseEntity::find().order_by_desc(employer_case::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(employer_case::Column::Status.eq(status.as_str()));
        }
        let models = query.all(self.db.as_ref()).await?;
        self.assemble(models).await
    }

    async fn create(&self, case: EmployerVerificationCase) -> AppResult<bool> {
        let txn = self.db.begin().await?;

        // idx_employer_cases_one_open
        match case_active_model(&case).insert(&txn).await {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        if !case.documents.is_empty() {
            DocumentEntity::insert_many(case.documents.into_iter().map(document_active_model))
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(true)
    }

    async fn append_document(&self, document: VerificationDocument) -> AppResult<()> {
        DocumentEntity::insert(document_active_model(document))
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn update_review(&self, document: VerificationDocument) -> AppResult<()> {
        let existing = DocumentEntity::find_by_id(document.id)
            .one(self.db.as_ref())
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: verification_document::ActiveModel = existing.into();
        active.review_status = Set(document.review_status.as_str().to_string());
        active.reviewer_note = Set(document.reviewer_note);
        active.reviewed_by = Set(document.reviewed_by);
        active.reviewed_at = Set(document.reviewed_at);
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn transition(&self, case: &EmployerVerificationCase, from: AccountStatus) -> AppResult<bool> {
        let result = CaseEntity::update_many()
            .col_expr(employer_case::Column::Status, Expr::value(case.status.as_str()))
            .col_expr(employer_case::Column::DecidedBy, Expr::value(case.decided_by.clone()))
            .col_expr(employer_case::Column::DecidedAt, Expr::value(case.decided_at))
            .col_expr(
                employer_case::Column::DecisionReason,
                Expr::value(case.decision_reason.clone()),
            )
            .col_expr(employer_case::Column::UpdatedAt, Expr::value(case.updated_at))
            .filter(employer_case::Column::Id.eq(case.id))
            .filter(employer_case::Column::Status.eq(from.as_str()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn mark_notified(&self, case_id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let result = CaseEntity::update_many()
            .col_expr(employer_case::Column::NotifiedAt, Expr::value(at))
            .filter(employer_case::Column::Id.eq(case_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DocumentType, ReviewStatus};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn case_row(id: Uuid, status: &str) -> employer_case::Model {
        let now = Utc::now();
        employer_case::Model {
            id,
            account_id: Uuid::new_v4(),
            email: "e@x.com".into(),
            status: status.into(),
            decided_by: None,
            decided_at: None,
            decision_reason: None,
            notified_at: None,
            previous_case_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn doc_row(case_id: Uuid, position: i32, ty: &str, review: &str) -> verification_document::Model {
        verification_document::Model {
            id: Uuid::new_v4(),
            case_id,
            position,
            document_type: ty.into(),
            storage_ref: format!("ref-{}", position),
            file_name: "doc.pdf".into(),
            content_type: "application/pdf".into(),
            uploaded_at: Utc::now(),
            review_status: review.into(),
            reviewer_note: None,
            reviewed_by: None,
            reviewed_at: None,
        }
    }

    #[tokio::test]
    async fn find_by_id_attaches_documents_in_order() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![case_row(id, "pending")]])
            .append_query_results([vec![
                doc_row(id, 0, "address_proof", "rejected"),
                doc_row(id, 1, "address_proof", "approved"),
            ]])
            .into_connection();

        let case = CaseStore::new(Arc::new(db)).find_by_id(id).await.unwrap().unwrap();
        assert_eq!(case.status, AccountStatus::Pending);
        assert_eq!(case.documents.len(), 2);
        assert_eq!(
            case.latest_document(DocumentType::AddressProof)
                .unwrap()
                .review_status,
            ReviewStatus::Approved
        );
    }

    #[tokio::test]
    async fn missing_case_yields_none_without_loading_documents() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<employer_case::Model>::new()])
            .into_connection();

        assert!(CaseStore::new(Arc::new(db))
            .find_by_id(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_document_type_is_reported_as_corrupt() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![case_row(id, "none")]])
            .append_query_results([vec![doc_row(id, 0, "passport_scan", "pending")]])
            .into_connection();

        let err = CaseStore::new(Arc::new(db)).find_by_id(id).await.unwrap_err();
        assert_eq!(err.code(), "internal-error");
    }

    #[tokio::test]
    async fn transition_reports_a_status_that_moved_on() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();
        let store = CaseStore::new(Arc::new(db));
        let decided = case_from_model(case_row(id, "verified"), Vec::new()).unwrap();

        assert!(store.transition(&decided, AccountStatus::Pending).await.unwrap());
        assert!(!store.transition(&decided, AccountStatus::Pending).await.unwrap());
    }
}
