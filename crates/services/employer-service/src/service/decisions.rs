//! Admin Decision Workflow.
//!
//! Administrators review individual documents, then approve or reject the
//! whole case. The registry is updated first; notices are best-effort and a
//! failed notice never undoes a decision.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use common::{AppError, AppResult, Notifier, TemplateKind};
use domain::{
    AccountStatus, CaseEvent, Decision, EmployerVerificationCase, ReviewStatus,
    VerificationDocument,
};
use registry_service_lib::repository::CaseRepository;
use registry_service_lib::service::IdentityRegistry;

use super::employer_account;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait AdminDecisions: Send + Sync {
    /// Set the review status of one document entry of an undecided case.
    async fn review_document(
        &self,
        case_id: Uuid,
        document_id: Uuid,
        status: ReviewStatus,
        note: Option<String>,
        reviewer: &str,
    ) -> AppResult<EmployerVerificationCase>;

    /// Approve or reject a pending case.
    async fn decide(
        &self,
        case_id: Uuid,
        decision: Decision,
        reason: Option<String>,
        decided_by: &str,
    ) -> AppResult<EmployerVerificationCase>;

    /// Suspend a verified (or pending) employer.
    async fn suspend(&self, email: &str, reason: String, decided_by: &str) -> AppResult<EmployerVerificationCase>;

    /// Lift a suspension.
    async fn reinstate(
        &self,
        email: &str,
        reason: Option<String>,
        decided_by: &str,
    ) -> AppResult<EmployerVerificationCase>;
}

/// Decision workflow over the registry and case repository
pub struct DecisionDesk {
    registry: Arc<dyn IdentityRegistry>,
    cases: Arc<dyn CaseRepository>,
    notifier: Arc<dyn Notifier>,
}

fn non_empty(reason: Option<String>) -> Option<String> {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

impl DecisionDesk {
    pub fn new(
        registry: Arc<dyn IdentityRegistry>,
        cases: Arc<dyn CaseRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            cases,
            notifier,
        }
    }

    async fn load(&self, case_id: Uuid) -> AppResult<EmployerVerificationCase> {
        self.cases.find_by_id(case_id).await?.ok_or(AppError::NotFound)
    }

    /// Only the newest case of an account may change its status.
    async fn ensure_active(&self, case: &EmployerVerificationCase) -> AppResult<()> {
        match self.cases.find_active(case.account_id).await? {
            Some(active) if active.id == case.id => Ok(()),
            _ => Err(AppError::InvalidTransition(
                "Case has been superseded by a newer submission".to_string(),
            )),
        }
    }

    /// Move a case and its account, then tell the employer.
    ///
    /// Both writes are conditional on the status this decision was checked
    /// against, so of two concurrent decisions on one case only one lands.
    async fn commit(
        &self,
        mut case: EmployerVerificationCase,
        event: CaseEvent,
        reason: Option<String>,
        decided_by: &str,
        template: TemplateKind,
    ) -> AppResult<EmployerVerificationCase> {
        let now = Utc::now();
        let from = case.status;
        let status = from.transition(event)?;

        // Account first: a case can lag behind its account, never lead it
        self.registry
            .set_account_status(&case.email, from, status, reason.clone())
            .await?;

        case.apply(event, now)?;
        case.record_decision(decided_by, reason, now);
        if !self.cases.transition(&case, from).await? {
            warn!(case_id = %case.id, expected = %from, "Case decided concurrently");
            return Err(AppError::InvalidTransition(
                "Case was decided by another administrator".to_string(),
            ));
        }
        info!(
            case_id = %case.id,
            email = %case.email,
            status = %status,
            decided_by,
            "Employer case {}",
            event
        );

        let payload = json!({
            "case_id": case.id,
            "status": status,
            "reason": case.decision_reason,
        });
        match self.notifier.send(&case.email, template, payload).await {
            Ok(delivery) => {
                let at = Utc::now();
                case.notified_at = Some(at);
                if let Err(e) = self.cases.mark_notified(case.id, at).await {
                    warn!(case_id = %case.id, error = %e, "Could not record notification time");
                } else {
                    info!(case_id = %case.id, delivery_id = %delivery.0, "Decision notice sent");
                }
            }
            Err(e) => {
                warn!(case_id = %case.id, template = %template, error = %e, "Decision notice not delivered");
            }
        }

        Ok(case)
    }
}

#[async_trait]
impl AdminDecisions for DecisionDesk {
    async fn review_document(
        &self,
        case_id: Uuid,
        document_id: Uuid,
        status: ReviewStatus,
        note: Option<String>,
        reviewer: &str,
    ) -> AppResult<EmployerVerificationCase> {
        let mut case = self.load(case_id).await?;
        if !case.is_open() {
            return Err(AppError::InvalidTransition(format!(
                "Documents of a {} case cannot be reviewed",
                case.status
            )));
        }

        let document = case
            .documents
            .iter()
            .find(|d| d.id == document_id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        let latest = case
            .latest_document(document.document_type)
            .map(|d| d.id == document.id)
            .unwrap_or(false);
        if !latest {
            return Err(AppError::validation(
                "A newer upload of this document type replaces this entry",
            ));
        }

        let now = Utc::now();
        let reviewed = VerificationDocument {
            review_status: status,
            reviewer_note: non_empty(note),
            reviewed_by: Some(reviewer.to_string()),
            reviewed_at: Some(now),
            ..document
        };
        self.cases.update_review(reviewed.clone()).await?;
        info!(
            case_id = %case.id,
            document_id = %reviewed.id,
            document_type = %reviewed.document_type,
            status = %status,
            reviewer,
            "Document reviewed"
        );

        if let Some(slot) = case.documents.iter_mut().find(|d| d.id == reviewed.id) {
            *slot = reviewed;
        }
        Ok(case)
    }

    async fn decide(
        &self,
        case_id: Uuid,
        decision: Decision,
        reason: Option<String>,
        decided_by: &str,
    ) -> AppResult<EmployerVerificationCase> {
        let case = self.load(case_id).await?;
        self.ensure_active(&case).await?;

        let reason = non_empty(reason);
        match decision {
            Decision::Approve => {
                case.status.transition(CaseEvent::Approve)?;
                let outstanding = case.unapproved_required_types();
                if !outstanding.is_empty() {
                    return Err(AppError::IncompleteReview { outstanding });
                }
                self.commit(case, CaseEvent::Approve, reason, decided_by, TemplateKind::EmployerApproved)
                    .await
            }
            Decision::Reject => {
                case.status.transition(CaseEvent::Reject)?;
                if reason.is_none() {
                    return Err(AppError::ReasonRequired);
                }
                self.commit(case, CaseEvent::Reject, reason, decided_by, TemplateKind::EmployerRejected)
                    .await
            }
        }
    }

    async fn suspend(&self, email: &str, reason: String, decided_by: &str) -> AppResult<EmployerVerificationCase> {
        let reason = non_empty(Some(reason)).ok_or(AppError::ReasonRequired)?;
        let account = employer_account(self.registry.as_ref(), email).await?;
        let case = self
            .cases
            .find_active(account.id)
            .await?
            .ok_or_else(|| AppError::InvalidTransition(format!("Cannot suspend when status is {}", AccountStatus::None)))?;

        self.commit(case, CaseEvent::Suspend, Some(reason), decided_by, TemplateKind::EmployerSuspended)
            .await
    }

    async fn reinstate(
        &self,
        email: &str,
        reason: Option<String>,
        decided_by: &str,
    ) -> AppResult<EmployerVerificationCase> {
        let account = employer_account(self.registry.as_ref(), email).await?;
        let case = self
            .cases
            .find_active(account.id)
            .await?
            .ok_or_else(|| AppError::InvalidTransition(format!("Cannot reinstate when status is {}", AccountStatus::None)))?;

        self.commit(case, CaseEvent::Reinstate, non_empty(reason), decided_by, TemplateKind::EmployerReinstated)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::EmployerVerification;
    use crate::testing::{upload, EmployerFixture};
    use domain::DocumentType;
    use registry_service_lib::repository::MockCaseRepository;

    const ADMIN: &str = "admin@portal.com";

    async fn review_all_but(fx: &EmployerFixture, case: &EmployerVerificationCase, skip: DocumentType) {
        for doc in case.current_documents() {
            if doc.document_type != skip {
                fx.desk
                    .review_document(case.id, doc.id, ReviewStatus::Approved, None, ADMIN)
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn approval_waits_for_every_required_document() {
        let fx = EmployerFixture::new().await;
        let case = fx.pending_case().await;
        review_all_but(&fx, &case, DocumentType::AddressProof).await;

        let err = fx
            .desk
            .decide(case.id, Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();
        match err {
            AppError::IncompleteReview { outstanding } => {
                assert_eq!(outstanding, vec![DocumentType::AddressProof])
            }
            other => panic!("unexpected error {other:?}"),
        }

        let address = case.latest_document(DocumentType::AddressProof).unwrap();
        fx.desk
            .review_document(case.id, address.id, ReviewStatus::Approved, None, ADMIN)
            .await
            .unwrap();

        let decided = fx
            .desk
            .decide(case.id, Decision::Approve, None, ADMIN)
            .await
            .unwrap();
        assert_eq!(decided.status, AccountStatus::Verified);
        assert_eq!(decided.decided_by.as_deref(), Some(ADMIN));
        assert!(decided.notified_at.is_some());
        assert_eq!(fx.account_status().await, AccountStatus::Verified);

        let sent = fx.notifier.sent();
        assert_eq!(sent.last().unwrap().template, TemplateKind::EmployerApproved);
    }

    #[tokio::test]
    async fn rejected_document_blocks_approval() {
        let fx = EmployerFixture::new().await;
        let case = fx.pending_case().await;
        review_all_but(&fx, &case, DocumentType::TaxIdentification).await;
        let tax = case.latest_document(DocumentType::TaxIdentification).unwrap();
        fx.desk
            .review_document(case.id, tax.id, ReviewStatus::Rejected, Some("blurry".into()), ADMIN)
            .await
            .unwrap();

        let err = fx
            .desk
            .decide(case.id, Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "incomplete-review");
        assert_eq!(fx.account_status().await, AccountStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_needs_a_reason() {
        let fx = EmployerFixture::new().await;
        let case = fx.pending_case().await;

        for reason in [None, Some("   ".to_string())] {
            let err = fx
                .desk
                .decide(case.id, Decision::Reject, reason, ADMIN)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::ReasonRequired));
        }

        let decided = fx
            .desk
            .decide(case.id, Decision::Reject, Some("Registration expired".into()), ADMIN)
            .await
            .unwrap();
        assert_eq!(decided.status, AccountStatus::Rejected);
        assert_eq!(decided.decision_reason.as_deref(), Some("Registration expired"));
        assert_eq!(fx.account_status().await, AccountStatus::Rejected);
    }

    #[tokio::test]
    async fn decisions_need_a_pending_case() {
        let fx = EmployerFixture::new().await;
        let case = fx
            .workflow
            .upload_document(EmployerFixture::EMAIL, upload(DocumentType::AddressProof))
            .await
            .unwrap();

        let err = fx
            .desk
            .decide(case.id, Decision::Reject, Some("no".into()), ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-transition");

        let err = fx
            .desk
            .decide(Uuid::new_v4(), Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn decided_cases_are_frozen() {
        let fx = EmployerFixture::new().await;
        let case = fx.approved_case().await;

        let doc = &case.documents[0];
        let err = fx
            .desk
            .review_document(case.id, doc.id, ReviewStatus::Rejected, None, ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-transition");

        let err = fx
            .desk
            .decide(case.id, Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-transition");
    }

    #[tokio::test]
    async fn superseded_cases_cannot_be_decided() {
        let fx = EmployerFixture::new().await;
        let old = fx.rejected_case(&[]).await;
        fx.workflow
            .upload_document(EmployerFixture::EMAIL, upload(DocumentType::AddressProof))
            .await
            .unwrap();

        let err = fx
            .desk
            .decide(old.id, Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-transition");
    }

    #[tokio::test]
    async fn suspension_and_reinstatement_round_trip() {
        let fx = EmployerFixture::new().await;
        fx.approved_case().await;

        let err = fx
            .desk
            .suspend(EmployerFixture::EMAIL, " ".into(), ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReasonRequired));

        let case = fx
            .desk
            .suspend(EmployerFixture::EMAIL, "Fraud report".into(), ADMIN)
            .await
            .unwrap();
        assert_eq!(case.status, AccountStatus::Suspended);
        assert_eq!(fx.account_status().await, AccountStatus::Suspended);

        let case = fx
            .desk
            .reinstate(EmployerFixture::EMAIL, None, ADMIN)
            .await
            .unwrap();
        assert_eq!(case.status, AccountStatus::Verified);
        assert_eq!(fx.account_status().await, AccountStatus::Verified);

        let err = fx
            .desk
            .reinstate(EmployerFixture::EMAIL, None, ADMIN)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid-transition");
    }

    #[tokio::test]
    async fn failed_notice_does_not_undo_decision() {
        let fx = EmployerFixture::new().await;
        let case = fx.pending_case().await;
        fx.notifier.set_failing(true);

        let decided = fx
            .desk
            .decide(case.id, Decision::Reject, Some("Mismatched names".into()), ADMIN)
            .await
            .unwrap();
        assert_eq!(decided.status, AccountStatus::Rejected);
        assert!(decided.notified_at.is_none());
        assert_eq!(fx.account_status().await, AccountStatus::Rejected);
    }

    #[tokio::test]
    async fn suspending_a_non_employer_is_forbidden() {
        let fx = EmployerFixture::new().await;
        let err = fx
            .desk
            .suspend(EmployerFixture::SEEKER, "spam".into(), ADMIN)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    async fn reviewed_case(fx: &EmployerFixture) -> EmployerVerificationCase {
        let case = fx.pending_case().await;
        for doc in case.current_documents() {
            fx.desk
                .review_document(case.id, doc.id, ReviewStatus::Approved, None, ADMIN)
                .await
                .unwrap();
        }
        fx.workflow.get_case(case.id).await.unwrap()
    }

    #[tokio::test]
    async fn decision_is_refused_once_the_account_status_moved() {
        let fx = EmployerFixture::new().await;
        let case = reviewed_case(&fx).await;
        // A competing rejection has already written the account
        fx.registry
            .set_account_status(
                EmployerFixture::EMAIL,
                AccountStatus::Pending,
                AccountStatus::Rejected,
                Some("Expired licence".into()),
            )
            .await
            .unwrap();

        let err = fx
            .desk
            .decide(case.id, Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid-transition");
        assert_eq!(fx.account_status().await, AccountStatus::Rejected);
        assert_eq!(fx.workflow.get_case(case.id).await.unwrap().status, AccountStatus::Pending);
        assert!(fx.notifier.sent().iter().all(|n| n.template != TemplateKind::EmployerApproved));
    }

    #[tokio::test]
    async fn decision_is_refused_once_the_case_was_decided() {
        let fx = EmployerFixture::new().await;
        let case = reviewed_case(&fx).await;
        let case_id = case.id;

        let mut cases = MockCaseRepository::new();
        let loaded = case.clone();
        cases
            .expect_find_by_id()
            .returning(move |_| Ok(Some(loaded.clone())));
        cases
            .expect_find_active()
            .returning(move |_| Ok(Some(case.clone())));
        cases
            .expect_transition()
            .withf(move |c, from| c.id == case_id && *from == AccountStatus::Pending)
            .times(1)
            .returning(|_, _| Ok(false));
        cases.expect_mark_notified().never();

        let desk = DecisionDesk::new(fx.registry.clone(), Arc::new(cases), fx.notifier.clone());
        let before = fx.notifier.sent().len();

        let err = desk
            .decide(case_id, Decision::Approve, None, ADMIN)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "invalid-transition");
        assert_eq!(fx.notifier.sent().len(), before);
    }
}
