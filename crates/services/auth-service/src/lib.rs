//! Auth Service Library
//!
//! Verification codes, the bridge to the hosted identity provider and portal
//! session tokens. Storage goes through the registry crate; nothing here owns
//! a table.

pub mod config;
pub mod provider;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::sync::Arc;

use tracing::info;

use common::{AppResult, Notifier};
use registry_service_lib::repository::OtpRepository;
use registry_service_lib::service::IdentityRegistry;
use registry_service_lib::RegistryHandles;

use crate::config::AuthConfig;
use crate::provider::{IdentityProvider, RestIdentityProvider};
use crate::service::{CredentialBridge, OtpEngine, OtpService, ProviderBridge, TokenIssuer};

/// Wired authentication services.
#[derive(Clone)]
pub struct AuthServices {
    pub otp: Arc<dyn OtpService>,
    pub bridge: Arc<dyn CredentialBridge>,
    pub tokens: TokenIssuer,
}

/// Build the services against the hosted identity provider.
pub fn build(
    config: &AuthConfig,
    registry: &RegistryHandles,
    notifier: Arc<dyn Notifier>,
) -> AppResult<AuthServices> {
    config.validate()?;
    let provider = Arc::new(RestIdentityProvider::new(config.provider.clone())?);
    info!(base_url = %config.provider.base_url, "Identity provider configured");

    assemble(
        config,
        registry.registry.clone(),
        registry.otp.clone(),
        notifier,
        provider,
    )
}

/// Build the services over any provider implementation.
pub fn assemble(
    config: &AuthConfig,
    registry: Arc<dyn IdentityRegistry>,
    challenges: Arc<dyn OtpRepository>,
    notifier: Arc<dyn Notifier>,
    provider: Arc<dyn IdentityProvider>,
) -> AppResult<AuthServices> {
    let tokens = TokenIssuer::new(&config.jwt)?;
    let otp: Arc<dyn OtpService> = Arc::new(OtpEngine::new(
        challenges,
        registry.clone(),
        notifier,
        config.otp,
    ));
    let bridge = Arc::new(ProviderBridge::new(
        provider,
        registry,
        otp.clone(),
        tokens.clone(),
    ));

    Ok(AuthServices { otp, bridge, tokens })
}
