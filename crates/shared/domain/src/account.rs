//! Account domain entity and related types.
//!
//! An account binds one email address to exactly one role. The role and the
//! email never change after creation; only the verification flags move.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ROLE_ADMIN, ROLE_EMPLOYER, ROLE_JOBSEEKER, ROLE_SUPERADMIN};
use crate::error::{DomainError, DomainResult};

/// Account roles enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    JobSeeker,
    Employer,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::JobSeeker => ROLE_JOBSEEKER,
            Role::Employer => ROLE_EMPLOYER,
            Role::Admin => ROLE_ADMIN,
            Role::SuperAdmin => ROLE_SUPERADMIN,
        }
    }

    /// Check if this role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    /// Roles anyone may register for without an administrator.
    pub fn is_self_service(&self) -> bool {
        matches!(self, Role::JobSeeker | Role::Employer)
    }

    /// Check if an account holding this role may enter the portal of `requested`.
    ///
    /// Roles are exclusive; the only widening is a super administrator
    /// signing into the admin portal.
    pub fn satisfies(&self, requested: Role) -> bool {
        *self == requested || (*self == Role::SuperAdmin && requested == Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_JOBSEEKER => Ok(Role::JobSeeker),
            ROLE_EMPLOYER => Ok(Role::Employer),
            ROLE_ADMIN => Ok(Role::Admin),
            ROLE_SUPERADMIN => Ok(Role::SuperAdmin),
            other => Err(DomainError::validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// Employer review status. Every account carries one, only employers move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    None,
    Pending,
    Verified,
    Rejected,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::None => "none",
            AccountStatus::Pending => "pending",
            AccountStatus::Verified => "verified",
            AccountStatus::Rejected => "rejected",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AccountStatus::None),
            "pending" => Ok(AccountStatus::Pending),
            "verified" => Ok(AccountStatus::Verified),
            "rejected" => Ok(AccountStatus::Rejected),
            "suspended" => Ok(AccountStatus::Suspended),
            other => Err(DomainError::validation(format!(
                "Unknown account status '{}'",
                other
            ))),
        }
    }
}

/// How the account's external identity was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Password,
    Sso,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Password => "password",
            CredentialKind::Sso => "sso",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(CredentialKind::Password),
            "sso" => Ok(CredentialKind::Sso),
            other => Err(DomainError::validation(format!(
                "Unknown credential kind '{}'",
                other
            ))),
        }
    }
}

/// Account domain entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    /// Lower-cased, trimmed email; the registry key
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    pub account_status: AccountStatus,
    pub credential_kind: CredentialKind,
    /// Provider-side user id. Lookup only, the provider owns that record.
    pub external_identity_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Check if the account is an employer (subject to document review)
    pub fn is_employer(&self) -> bool {
        self.role == Role::Employer
    }

    /// Check if the given provider identity is the one this account was created with
    pub fn owns_identity(&self, external_id: &str) -> bool {
        self.external_identity_ref.as_deref() == Some(external_id)
    }
}

/// Account creation data
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub email: String,
    pub role: Role,
    pub credential_kind: CredentialKind,
    pub external_identity_ref: Option<String>,
    pub email_verified: bool,
}

impl NewAccount {
    /// Build a registration request; the email is normalised here.
    pub fn new(email: &str, role: Role, credential_kind: CredentialKind) -> DomainResult<Self> {
        Ok(Self {
            email: normalize_email(email)?,
            role,
            credential_kind,
            external_identity_ref: None,
            email_verified: false,
        })
    }

    /// Attach the provider-side identity id
    pub fn with_external_ref(mut self, external_id: impl Into<String>) -> Self {
        self.external_identity_ref = Some(external_id.into());
        self
    }

    /// Create the account already verified (administrator bootstrap)
    pub fn verified(mut self) -> Self {
        self.email_verified = true;
        self
    }
}

/// Account response (safe to return to client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub email_verified: bool,
    /// Only present for employers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_status: Option<AccountStatus>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
            email_verified: account.email_verified,
            account_status: account.is_employer().then_some(account.account_status),
            created_at: account.created_at,
        }
    }
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        AccountResponse::from(&account)
    }
}

/// Normalise an email into its registry key form.
///
/// Emails are compared case-insensitively, so the key is the trimmed,
/// lower-cased address.
pub fn normalize_email(email: &str) -> DomainResult<String> {
    let email = email.trim().to_lowercase();

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| DomainError::validation("Email must contain '@'"))?;

    if local.is_empty()
        || domain.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(DomainError::validation("Invalid email address"));
    }

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  A@X.Com ").unwrap(), "a@x.com");
    }

    #[test]
    fn rejects_malformed_emails() {
        for bad in ["", "ax.com", "a@", "@x.com", "a@b@x.com", "a@x", "a b@x.com", "a@.com"] {
            assert!(normalize_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn role_round_trips_through_storage_form() {
        for role in [Role::JobSeeker, Role::Employer, Role::Admin, Role::SuperAdmin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("user".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::JobSeeker).unwrap(), "\"jobseeker\"");
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"superadmin\"");
    }

    #[test]
    fn roles_are_exclusive_except_superadmin_for_admin() {
        assert!(!Role::JobSeeker.satisfies(Role::Employer));
        assert!(!Role::Employer.satisfies(Role::JobSeeker));
        assert!(!Role::Admin.satisfies(Role::SuperAdmin));
        assert!(Role::SuperAdmin.satisfies(Role::Admin));
        assert!(Role::Employer.satisfies(Role::Employer));
    }

    #[test]
    fn response_hides_status_for_non_employers() {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            role: Role::JobSeeker,
            email_verified: true,
            account_status: AccountStatus::None,
            credential_kind: CredentialKind::Password,
            external_identity_ref: None,
            created_at: now,
            updated_at: now,
        };
        assert!(AccountResponse::from(&account).account_status.is_none());

        let employer = Account {
            role: Role::Employer,
            ..account
        };
        assert_eq!(
            AccountResponse::from(&employer).account_status,
            Some(AccountStatus::None)
        );
    }
}
