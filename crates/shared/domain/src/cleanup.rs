//! Records of external identities that could not be removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An identity left behind at the provider after a failed compensating delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityCleanup {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    /// Flow that tried to discard the identity
    pub reason: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl IdentityCleanup {
    pub fn new(
        external_id: impl Into<String>,
        email: impl Into<String>,
        reason: impl Into<String>,
        last_error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            email: email.into(),
            reason: reason.into(),
            attempts: 1,
            last_error: Some(last_error.into()),
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
