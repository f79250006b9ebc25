//! Application state for dependency injection.

use std::sync::Arc;

use auth_service_lib::AuthServices;
use employer_service_lib::EmployerServices;
use registry_service_lib::infra::Database;
use registry_service_lib::service::IdentityRegistry;

use crate::config::GatewayConfig;
use crate::middleware::RateLimiter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthServices,
    pub employers: EmployerServices,
    pub registry: Arc<dyn IdentityRegistry>,
    pub limiter: Arc<dyn RateLimiter>,
    /// Absent when the services run over in-memory storage
    pub database: Option<Database>,
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new app state.
    pub fn new(
        auth: AuthServices,
        employers: EmployerServices,
        registry: Arc<dyn IdentityRegistry>,
        limiter: Arc<dyn RateLimiter>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            auth,
            employers,
            registry,
            limiter,
            database: None,
            config,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}
