//! Employer review use cases.

mod decisions;
mod verification;

pub use decisions::{AdminDecisions, DecisionDesk};
pub use verification::{CaseWorkflow, EmployerStatus, EmployerVerification, UploadDocument};

#[cfg(any(test, feature = "test-utils"))]
pub use decisions::MockAdminDecisions;
#[cfg(any(test, feature = "test-utils"))]
pub use verification::MockEmployerVerification;

use common::{AppError, AppResult};
use domain::{normalize_email, Account};
use registry_service_lib::service::IdentityRegistry;

/// Look up an account that must be an employer.
pub(crate) async fn employer_account(registry: &dyn IdentityRegistry, email: &str) -> AppResult<Account> {
    let email = normalize_email(email)?;
    let account = registry.lookup(&email).await?;
    if !account.is_employer() {
        return Err(AppError::Forbidden);
    }
    Ok(account)
}
