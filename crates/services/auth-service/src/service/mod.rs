//! Authentication use cases: verification codes, the provider bridge and
//! portal sessions.

pub mod bridge;
pub mod otp_service;
pub mod session;

pub use bridge::{
    CredentialBridge, EmailCheck, ProviderBridge, ReconcileReport, RegistrationOutcome,
    ReviewCredential, ReviewSession, SsoIntent, SsoOutcome,
};
pub use otp_service::{OtpEngine, OtpService};
pub use session::{AuthorizedSession, Claims, SessionScope, TokenIssuer, TokenResponse};

#[cfg(any(test, feature = "test-utils"))]
pub use bridge::MockCredentialBridge;
#[cfg(any(test, feature = "test-utils"))]
pub use otp_service::MockOtpService;
