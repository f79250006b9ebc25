//! Database migrations.
//!
//! Migration names follow the pattern: m{YYYYMMDD}_{NNNNNN}_{description}

use sea_orm_migration::prelude::*;

mod m20250301_000001_create_accounts;
mod m20250301_000002_create_otp_challenges;
mod m20250302_000001_create_employer_cases;
mod m20250305_000001_create_identity_cleanups;
mod m20250306_000001_one_open_case_per_account;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_accounts::Migration),
            Box::new(m20250301_000002_create_otp_challenges::Migration),
            Box::new(m20250302_000001_create_employer_cases::Migration),
            Box::new(m20250305_000001_create_identity_cleanups::Migration),
            Box::new(m20250306_000001_one_open_case_per_account::Migration),
        ]
    }
}
