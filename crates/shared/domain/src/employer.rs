//! Employer verification cases and the review state machine.
//!
//! A case is one round of document review for an employer account. Document
//! entries are append-only: a replacement upload adds a new entry and the
//! latest entry per document type is the one that counts. A rejected case is
//! never edited again; resubmitting opens a new case that points back to it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountStatus;
use crate::error::{DomainError, DomainResult};

/// Kinds of documents an employer can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    BusinessRegistration,
    TaxIdentification,
    AddressProof,
    AuthorizedSignatoryId,
    Other,
}

/// Document types that must be present before a case can be reviewed.
pub const REQUIRED_DOCUMENT_TYPES: [DocumentType; 4] = [
    DocumentType::BusinessRegistration,
    DocumentType::TaxIdentification,
    DocumentType::AddressProof,
    DocumentType::AuthorizedSignatoryId,
];

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::BusinessRegistration => "business_registration",
            DocumentType::TaxIdentification => "tax_identification",
            DocumentType::AddressProof => "address_proof",
            DocumentType::AuthorizedSignatoryId => "authorized_signatory_id",
            DocumentType::Other => "other",
        }
    }

    pub fn is_required(&self) -> bool {
        REQUIRED_DOCUMENT_TYPES.contains(self)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "business_registration" => Ok(DocumentType::BusinessRegistration),
            "tax_identification" => Ok(DocumentType::TaxIdentification),
            "address_proof" => Ok(DocumentType::AddressProof),
            "authorized_signatory_id" => Ok(DocumentType::AuthorizedSignatoryId),
            "other" => Ok(DocumentType::Other),
            other => Err(DomainError::validation(format!(
                "Unknown document type '{}'",
                other
            ))),
        }
    }
}

/// Review outcome of a single document entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    RequiresResubmission,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::RequiresResubmission => "requires_resubmission",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            "requires_resubmission" => Ok(ReviewStatus::RequiresResubmission),
            other => Err(DomainError::validation(format!(
                "Unknown review status '{}'",
                other
            ))),
        }
    }
}

/// Administrator decision on a whole case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Events that move a case (and its account) through the review states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseEvent {
    /// The last missing required document type received an upload
    DocumentsComplete,
    Approve,
    Reject,
    Suspend,
    Reinstate,
    /// New documents uploaded after a rejection
    Resubmit,
}

impl fmt::Display for CaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaseEvent::DocumentsComplete => "complete documents",
            CaseEvent::Approve => "approve",
            CaseEvent::Reject => "reject",
            CaseEvent::Suspend => "suspend",
            CaseEvent::Reinstate => "reinstate",
            CaseEvent::Resubmit => "resubmit",
        };
        f.write_str(name)
    }
}

impl AccountStatus {
    /// Apply a review event.
    ///
    /// ```text
    /// none --DocumentsComplete--> pending --Approve--> verified
    ///                              |    \--Reject---> rejected --Resubmit--> none (new case)
    ///                              \------Suspend---> suspended
    /// verified --Suspend--> suspended --Reinstate--> verified
    /// ```
    pub fn transition(self, event: CaseEvent) -> DomainResult<AccountStatus> {
        use AccountStatus::*;

        match (self, event) {
            (None, CaseEvent::DocumentsComplete) => Ok(Pending),
            (Pending, CaseEvent::Approve) => Ok(Verified),
            (Pending, CaseEvent::Reject) => Ok(Rejected),
            (Pending | Verified, CaseEvent::Suspend) => Ok(Suspended),
            (Suspended, CaseEvent::Reinstate) => Ok(Verified),
            (Rejected, CaseEvent::Resubmit) => Ok(None),
            (from, event) => Err(DomainError::invalid_transition(from, event)),
        }
    }
}

/// One uploaded document entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VerificationDocument {
    pub id: Uuid,
    pub case_id: Uuid,
    /// Order of the entry within its case
    pub position: i32,
    pub document_type: DocumentType,
    /// Opaque document store reference
    pub storage_ref: String,
    pub file_name: String,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub review_status: ReviewStatus,
    pub reviewer_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Metadata of a new document entry.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_type: DocumentType,
    pub storage_ref: String,
    pub file_name: String,
    pub content_type: String,
}

/// A review round for one employer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EmployerVerificationCase {
    pub id: Uuid,
    pub account_id: Uuid,
    pub email: String,
    pub status: AccountStatus,
    pub documents: Vec<VerificationDocument>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    /// Set once the account holder was told about the latest decision
    pub notified_at: Option<DateTime<Utc>>,
    /// The rejected case this one resubmits
    pub previous_case_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmployerVerificationCase {
    /// Open an empty case for an account.
    pub fn open(account_id: Uuid, email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            email: email.to_string(),
            status: AccountStatus::None,
            documents: Vec::new(),
            decided_by: None,
            decided_at: None,
            decision_reason: None,
            notified_at: None,
            previous_case_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Open the follow-up case of a rejected one.
    ///
    /// Approved entries are carried forward as fresh entries so reviewers do
    /// not have to look at them again; everything else must be uploaded anew.
    pub fn resubmission_of(previous: &EmployerVerificationCase, now: DateTime<Utc>) -> DomainResult<Self> {
        let status = previous.status.transition(CaseEvent::Resubmit)?;
        let mut case = Self::open(previous.account_id, &previous.email, now);
        case.status = status;
        case.previous_case_id = Some(previous.id);

        let carried: Vec<VerificationDocument> = previous
            .current_documents()
            .into_iter()
            .filter(|doc| doc.review_status == ReviewStatus::Approved)
            .cloned()
            .collect();
        for doc in carried {
            let position = case.documents.len() as i32;
            case.documents.push(VerificationDocument {
                id: Uuid::new_v4(),
                case_id: case.id,
                position,
                ..doc
            });
        }

        Ok(case)
    }

    /// Build the next entry for this case without attaching it.
    pub fn new_entry(&self, document: NewDocument, now: DateTime<Utc>) -> VerificationDocument {
        VerificationDocument {
            id: Uuid::new_v4(),
            case_id: self.id,
            position: self.documents.len() as i32,
            document_type: document.document_type,
            storage_ref: document.storage_ref,
            file_name: document.file_name,
            content_type: document.content_type,
            uploaded_at: now,
            review_status: ReviewStatus::Pending,
            reviewer_note: None,
            reviewed_by: None,
            reviewed_at: None,
        }
    }

    /// Latest entry of a document type.
    pub fn latest_document(&self, document_type: DocumentType) -> Option<&VerificationDocument> {
        self.documents
            .iter()
            .filter(|doc| doc.document_type == document_type)
            .max_by_key(|doc| doc.position)
    }

    /// Latest entry of every type that has one, in upload order.
    pub fn current_documents(&self) -> Vec<&VerificationDocument> {
        let mut current: Vec<&VerificationDocument> = self
            .documents
            .iter()
            .filter(|doc| {
                self.latest_document(doc.document_type)
                    .map(|latest| latest.id == doc.id)
                    .unwrap_or(false)
            })
            .collect();
        current.sort_by_key(|doc| doc.position);
        current
    }

    /// Required types with no entry at all.
    pub fn missing_required_types(&self) -> Vec<DocumentType> {
        REQUIRED_DOCUMENT_TYPES
            .iter()
            .copied()
            .filter(|ty| self.latest_document(*ty).is_none())
            .collect()
    }

    pub fn has_all_required(&self) -> bool {
        self.missing_required_types().is_empty()
    }

    /// Required types whose latest entry is not approved (including missing ones).
    pub fn unapproved_required_types(&self) -> Vec<DocumentType> {
        REQUIRED_DOCUMENT_TYPES
            .iter()
            .copied()
            .filter(|ty| {
                self.latest_document(*ty)
                    .map(|doc| doc.review_status != ReviewStatus::Approved)
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Check if any required type's latest entry was rejected
    pub fn has_rejected_required(&self) -> bool {
        REQUIRED_DOCUMENT_TYPES.iter().any(|ty| {
            self.latest_document(*ty)
                .map(|doc| doc.review_status == ReviewStatus::Rejected)
                .unwrap_or(false)
        })
    }

    /// Check if documents may still be added or reviewed in this case
    pub fn is_open(&self) -> bool {
        matches!(self.status, AccountStatus::None | AccountStatus::Pending)
    }

    /// Apply an event to the case status.
    pub fn apply(&mut self, event: CaseEvent, now: DateTime<Utc>) -> DomainResult<AccountStatus> {
        self.status = self.status.transition(event)?;
        self.updated_at = now;
        Ok(self.status)
    }

    /// Record who decided and why.
    pub fn record_decision(&mut self, decided_by: &str, reason: Option<String>, now: DateTime<Utc>) {
        self.decided_by = Some(decided_by.to_string());
        self.decided_at = Some(now);
        self.decision_reason = reason;
        self.notified_at = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(case: &mut EmployerVerificationCase, ty: DocumentType, status: ReviewStatus) {
        let mut doc = case.new_entry(
            NewDocument {
                document_type: ty,
                storage_ref: format!("ref-{}", ty),
                file_name: format!("{}.pdf", ty),
                content_type: "application/pdf".into(),
            },
            Utc::now(),
        );
        doc.review_status = status;
        case.documents.push(doc);
    }

    #[test]
    fn transitions_follow_the_review_graph() {
        use AccountStatus::*;
        assert_eq!(None.transition(CaseEvent::DocumentsComplete).unwrap(), Pending);
        assert_eq!(Pending.transition(CaseEvent::Approve).unwrap(), Verified);
        assert_eq!(Pending.transition(CaseEvent::Reject).unwrap(), Rejected);
        assert_eq!(Verified.transition(CaseEvent::Suspend).unwrap(), Suspended);
        assert_eq!(Suspended.transition(CaseEvent::Reinstate).unwrap(), Verified);
        assert_eq!(Rejected.transition(CaseEvent::Resubmit).unwrap(), None);
    }

    #[test]
    fn no_autonomous_exit_from_pending_or_shortcuts() {
        use AccountStatus::*;
        assert!(None.transition(CaseEvent::Approve).is_err());
        assert!(Rejected.transition(CaseEvent::Approve).is_err());
        assert!(Suspended.transition(CaseEvent::Approve).is_err());
        assert!(Verified.transition(CaseEvent::Reinstate).is_err());
        assert!(Verified.transition(CaseEvent::Reject).is_err());
        assert!(Pending.transition(CaseEvent::DocumentsComplete).is_err());
    }

    #[test]
    fn latest_entry_per_type_wins() {
        let mut case = EmployerVerificationCase::open(Uuid::new_v4(), "e@x.com", Utc::now());
        upload(&mut case, DocumentType::AddressProof, ReviewStatus::Rejected);
        upload(&mut case, DocumentType::AddressProof, ReviewStatus::Pending);

        assert_eq!(case.documents.len(), 2);
        assert_eq!(
            case.latest_document(DocumentType::AddressProof).unwrap().review_status,
            ReviewStatus::Pending
        );
        assert_eq!(case.current_documents().len(), 1);
        assert!(!case.has_rejected_required());
    }

    #[test]
    fn completeness_and_approval_tracking() {
        let mut case = EmployerVerificationCase::open(Uuid::new_v4(), "e@x.com", Utc::now());
        upload(&mut case, DocumentType::BusinessRegistration, ReviewStatus::Approved);
        upload(&mut case, DocumentType::TaxIdentification, ReviewStatus::Approved);
        upload(&mut case, DocumentType::AddressProof, ReviewStatus::Approved);
        assert_eq!(
            case.missing_required_types(),
            vec![DocumentType::AuthorizedSignatoryId]
        );

        upload(&mut case, DocumentType::AuthorizedSignatoryId, ReviewStatus::Pending);
        assert!(case.has_all_required());
        assert_eq!(
            case.unapproved_required_types(),
            vec![DocumentType::AuthorizedSignatoryId]
        );
    }

    #[test]
    fn optional_documents_do_not_count_towards_completeness() {
        let mut case = EmployerVerificationCase::open(Uuid::new_v4(), "e@x.com", Utc::now());
        upload(&mut case, DocumentType::Other, ReviewStatus::Pending);
        assert_eq!(case.missing_required_types().len(), 4);
    }

    #[test]
    fn resubmission_carries_forward_only_approved_entries() {
        let mut rejected = EmployerVerificationCase::open(Uuid::new_v4(), "e@x.com", Utc::now());
        upload(&mut rejected, DocumentType::BusinessRegistration, ReviewStatus::Approved);
        upload(&mut rejected, DocumentType::TaxIdentification, ReviewStatus::Rejected);
        rejected.status = AccountStatus::Rejected;

        let next = EmployerVerificationCase::resubmission_of(&rejected, Utc::now()).unwrap();
        assert_eq!(next.status, AccountStatus::None);
        assert_eq!(next.previous_case_id, Some(rejected.id));
        assert_eq!(next.documents.len(), 1);
        assert_eq!(next.documents[0].document_type, DocumentType::BusinessRegistration);
        assert_eq!(next.documents[0].case_id, next.id);
        assert_ne!(next.documents[0].id, rejected.documents[0].id);
        // The terminal record is untouched
        assert_eq!(rejected.documents.len(), 2);
    }

    #[test]
    fn resubmission_requires_a_rejected_case() {
        let pending = EmployerVerificationCase {
            status: AccountStatus::Pending,
            ..EmployerVerificationCase::open(Uuid::new_v4(), "e@x.com", Utc::now())
        };
        assert!(EmployerVerificationCase::resubmission_of(&pending, Utc::now()).is_err());
    }
}
