//! Service layer - registry use cases.

mod registry_service;

pub use registry_service::{IdentityRegistry, RegistryManager};

#[cfg(any(test, feature = "test-utils"))]
pub use registry_service::MockIdentityRegistry;
