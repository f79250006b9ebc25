//! Registry Service Library
//!
//! Owns the identity database: accounts, verification code slots, employer
//! review cases and pending provider cleanups. The other services reach this
//! storage only through the repository and registry traits exported here.

pub mod config;
pub mod infra;
pub mod repository;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::sync::Arc;

use tracing::info;

use crate::config::RegistryConfig;
use crate::infra::Database;
use crate::repository::{
    AccountStore, CaseRepository, CaseStore, CleanupStore, OtpRepository, OtpStore,
};
use crate::service::{IdentityRegistry, RegistryManager};

pub use crate::infra::Migrator;

/// Handles to everything the registry database backs.
#[derive(Clone)]
pub struct RegistryHandles {
    pub database: Database,
    pub registry: Arc<dyn IdentityRegistry>,
    pub otp: Arc<dyn OtpRepository>,
    pub cases: Arc<dyn CaseRepository>,
}

/// Connect, migrate and wire the repositories.
pub async fn connect(config: &RegistryConfig) -> Result<RegistryHandles, Box<dyn std::error::Error>> {
    let database = Database::connect(&config.database).await?;
    Ok(build(database))
}

/// Wire the repositories over an existing database handle.
pub fn build(database: Database) -> RegistryHandles {
    let conn = database.get_connection();
    let registry = Arc::new(RegistryManager::new(
        Arc::new(AccountStore::new(conn.clone())),
        Arc::new(CleanupStore::new(conn.clone())),
    ));

    RegistryHandles {
        database,
        registry,
        otp: Arc::new(OtpStore::new(conn.clone())),
        cases: Arc::new(CaseStore::new(conn)),
    }
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = RegistryConfig::from_env();
    let db = Database::connect_without_migrations(&config.database).await?;

    match action {
        MigrateAction::Up => {
            db.run_migrations().await?;
            info!("Migrations applied successfully");
        }
        MigrateAction::Down => {
            db.rollback_migration().await?;
            info!("Rolled back last migration");
        }
        MigrateAction::Status => {
            let status = db.migration_status().await?;
            for (name, applied) in status {
                let marker = if applied { "[x]" } else { "[ ]" };
                println!("{} {}", marker, name);
            }
        }
        MigrateAction::Fresh => {
            db.fresh_migrations().await?;
            info!("Database reset and migrations applied");
        }
    }

    Ok(())
}

/// Migration action type.
#[derive(Debug, Clone, Copy)]
pub enum MigrateAction {
    Up,
    Down,
    Status,
    Fresh,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn build_shares_one_connection_across_stores() {
        let connection = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let handles = build(Database::from_connection(connection));

        // database handle, the one held here, four stores
        assert_eq!(Arc::strong_count(&handles.database.get_connection()), 6);
        handles.database.ping().await.unwrap();
    }
}
