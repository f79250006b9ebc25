//! Registry service configuration.

use std::env;

use common::DatabaseConfig;

/// Registry service configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Connection settings for the registry database
    pub database: DatabaseConfig,
}

impl RegistryConfig {
    /// Load configuration from environment variables.
    ///
    /// `REGISTRY_DATABASE_URL` overrides the shared `DATABASE_URL`.
    pub fn from_env() -> Self {
        let mut database = DatabaseConfig::from_env();
        if let Ok(url) = env::var("REGISTRY_DATABASE_URL") {
            database.url = url;
        }
        Self { database }
    }
}
