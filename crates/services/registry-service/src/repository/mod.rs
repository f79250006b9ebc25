//! Repository layer for data access.

mod account_repository;
mod case_repository;
mod cleanup_repository;
pub mod entities;
mod otp_repository;

pub use account_repository::{AccountRepository, AccountStore};
pub use case_repository::{CaseRepository, CaseStore};
pub use cleanup_repository::{CleanupRepository, CleanupStore};
pub use otp_repository::{OtpRepository, OtpStore};

#[cfg(any(test, feature = "test-utils"))]
pub use account_repository::MockAccountRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use case_repository::MockCaseRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use cleanup_repository::MockCleanupRepository;
#[cfg(any(test, feature = "test-utils"))]
pub use otp_repository::MockOtpRepository;

use common::AppError;
use domain::DomainError;
use sea_orm::{DbErr, SqlErr};

/// A stored row that no longer parses into its domain type.
pub(crate) fn corrupt_row(table: &str, err: DomainError) -> AppError {
    AppError::internal(format!("Corrupt {} row: {}", table, err))
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
