//! API Gateway Library
//!
//! The HTTP boundary of the identity and verification services, plus the
//! operator commands the CLI exposes.

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use auth_service_lib::config::AuthConfig;
use auth_service_lib::service::ReconcileReport;
use auth_service_lib::AuthServices;
use common::{LogNotifier, Notifier, NotifyConfig, RelayNotifier};
use domain::Account;
use employer_service_lib::config::EmployerConfig;
use registry_service_lib::config::RegistryConfig;
use registry_service_lib::RegistryHandles;

use crate::config::GatewayConfig;
use crate::middleware::{Cache, LocalRateLimiter, RateLimiter};
use crate::routes::create_router;
use crate::state::AppState;

pub use registry_service_lib::MigrateAction;

/// Pick the notification transport from configuration.
fn notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match &config.relay_url {
        Some(url) => {
            info!(relay = %url, "Notifications go through the mail relay");
            Arc::new(RelayNotifier::new(url.clone(), config.relay_token.clone()))
        }
        None => {
            warn!("NOTIFY_RELAY_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    }
}

/// Shared counters in Redis when configured, process-local otherwise.
async fn rate_limiter(config: &GatewayConfig) -> Result<Arc<dyn RateLimiter>, Box<dyn Error>> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(Cache::connect(url).await?)),
        None => {
            warn!("REDIS_URL not set, rate limits are per process");
            Ok(Arc::new(LocalRateLimiter::new()))
        }
    }
}

async fn auth_services() -> Result<(RegistryHandles, AuthServices), Box<dyn Error>> {
    let registry = registry_service_lib::connect(&RegistryConfig::from_env()).await?;
    let notifier = notifier(&NotifyConfig::from_env());
    let auth = auth_service_lib::build(&AuthConfig::from_env(), &registry, notifier)?;
    Ok((registry, auth))
}

/// Run the HTTP server.
pub async fn run_server(host: &str, port: u16) -> Result<(), Box<dyn Error>> {
    let config = GatewayConfig::from_env();

    let registry = registry_service_lib::connect(&RegistryConfig::from_env()).await?;
    let notifier = notifier(&NotifyConfig::from_env());
    let auth = auth_service_lib::build(&AuthConfig::from_env(), &registry, notifier.clone())?;
    let employers = employer_service_lib::build(&EmployerConfig::from_env(), &registry, notifier);
    let limiter = rate_limiter(&config).await?;

    // Create app state
    let state = AppState::new(auth, employers, registry.registry.clone(), limiter, config)
        .with_database(registry.database.clone());

    // Build router
    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Build address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Gateway listening on {}", addr);

    // Run server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Run migrations (for CLI commands).
pub async fn run_migrations(action: MigrateAction) -> Result<(), Box<dyn Error>> {
    registry_service_lib::run_migrations(action).await
}

/// Create a verified administrator account.
pub async fn create_admin(email: &str, password: &str, super_admin: bool) -> Result<Account, Box<dyn Error>> {
    let (_registry, auth) = auth_services().await?;
    let account = auth.bridge.bootstrap_admin(email, password, super_admin).await?;
    info!(email = %account.email, role = %account.role, "Administrator created");
    Ok(account)
}

/// Retry deletes of orphaned provider identities.
pub async fn reconcile() -> Result<ReconcileReport, Box<dyn Error>> {
    let (_registry, auth) = auth_services().await?;
    let report = auth.bridge.reconcile().await?;
    info!(
        attempted = report.attempted,
        resolved = report.resolved,
        failed = report.failed,
        "Reconciliation finished"
    );
    Ok(report)
}
