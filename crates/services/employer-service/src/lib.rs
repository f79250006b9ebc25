//! Employer Service Library
//!
//! Employer document review: the verification state machine driven by
//! uploads and the administrator decision workflow.

pub mod config;
pub mod service;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::sync::Arc;

use tracing::info;

use common::Notifier;
use registry_service_lib::repository::CaseRepository;
use registry_service_lib::service::IdentityRegistry;
use registry_service_lib::RegistryHandles;

use crate::config::EmployerConfig;
use crate::service::{AdminDecisions, CaseWorkflow, DecisionDesk, EmployerVerification};
use crate::store::{DocumentStore, LocalDocumentStore};

/// Wired employer review services.
#[derive(Clone)]
pub struct EmployerServices {
    pub verification: Arc<dyn EmployerVerification>,
    pub decisions: Arc<dyn AdminDecisions>,
}

/// Build the services with the filesystem document store.
pub fn build(
    config: &EmployerConfig,
    registry: &RegistryHandles,
    notifier: Arc<dyn Notifier>,
) -> EmployerServices {
    info!(dir = %config.document_dir.display(), "Document store configured");
    let documents = Arc::new(LocalDocumentStore::new(config.document_dir.clone()));
    assemble(
        config,
        registry.registry.clone(),
        registry.cases.clone(),
        notifier,
        documents,
    )
}

/// Build the services over any document store.
pub fn assemble(
    config: &EmployerConfig,
    registry: Arc<dyn IdentityRegistry>,
    cases: Arc<dyn CaseRepository>,
    notifier: Arc<dyn Notifier>,
    documents: Arc<dyn DocumentStore>,
) -> EmployerServices {
    EmployerServices {
        verification: Arc::new(CaseWorkflow::new(
            registry.clone(),
            cases.clone(),
            documents,
            config.max_document_bytes,
        )),
        decisions: Arc::new(DecisionDesk::new(registry, cases, notifier)),
    }
}
