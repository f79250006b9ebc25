//! Domain layer - Core identity and verification entities.
//!
//! This crate contains pure domain logic with no infrastructure dependencies:
//! accounts and roles, one-time codes, employer review cases and the review
//! state machine.

pub mod account;
pub mod cleanup;
pub mod constants;
pub mod employer;
pub mod error;
pub mod otp;

pub use account::{
    normalize_email, Account, AccountResponse, AccountStatus, CredentialKind, NewAccount, Role,
};
pub use cleanup::IdentityCleanup;
pub use constants::*;
pub use employer::{
    CaseEvent, Decision, DocumentType, EmployerVerificationCase, NewDocument, ReviewStatus,
    VerificationDocument, REQUIRED_DOCUMENT_TYPES,
};
pub use error::{DomainError, DomainResult};
pub use otp::{IssuedChallenge, OtpChallenge, OtpCode};
