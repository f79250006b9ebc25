//! Repository for provider identities that still need deleting.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use super::entities::identity_cleanup::{self, ActiveModel, Entity as CleanupEntity};
use common::{AppError, AppResult};
use domain::IdentityCleanup;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CleanupRepository: Send + Sync {
    async fn record(&self, cleanup: IdentityCleanup) -> AppResult<()>;

    /// Unresolved records, oldest first
    async fn list_unresolved(&self) -> AppResult<Vec<IdentityCleanup>>;

    /// Persist attempt count, last error and resolution
    async fn save(&self, cleanup: IdentityCleanup) -> AppResult<()>;
}

pub struct CleanupStore {
    db: Arc<DatabaseConnection>,
}

impl CleanupStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CleanupRepository for CleanupStore {
    async fn record(&self, cleanup: IdentityCleanup) -> AppResult<()> {
        ActiveModel {
            id: Set(cleanup.id),
            external_id: Set(cleanup.external_id),
            email: Set(cleanup.email),
            reason: Set(cleanup.reason),
            attempts: Set(cleanup.attempts),
            last_error: Set(cleanup.last_error),
            created_at: Set(cleanup.created_at),
            resolved_at: Set(cleanup.resolved_at),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(())
    }

    async fn list_unresolved(&self) -> AppResult<Vec<IdentityCleanup>> {
        Ok(CleanupEntity::find()
            .filter(identity_cleanup::Column::ResolvedAt.is_null())
            .order_by_asc(identity_cleanup::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(IdentityCleanup::from)
            .collect())
    }

    async fn save(&self, cleanup: IdentityCleanup) -> AppResult<()> {
        let existing = CleanupEntity::find_by_id(cleanup.id)
            .one(self.db.as_ref())
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: ActiveModel = existing.into();
        active.attempts = Set(cleanup.attempts);
        active.last_error = Set(cleanup.last_error);
        active.resolved_at = Set(cleanup.resolved_at);
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}
