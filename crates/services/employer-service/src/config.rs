//! Employer service configuration.

use std::env;
use std::path::PathBuf;

use common::env_or;
use domain::MAX_DOCUMENT_BYTES;

/// Employer review configuration.
#[derive(Debug, Clone)]
pub struct EmployerConfig {
    /// Directory the local document store writes into
    pub document_dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_document_bytes: usize,
}

impl Default for EmployerConfig {
    fn default() -> Self {
        Self {
            document_dir: PathBuf::from("./data/documents"),
            max_document_bytes: MAX_DOCUMENT_BYTES,
        }
    }
}

impl EmployerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            document_dir: env::var("DOCUMENT_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.document_dir),
            max_document_bytes: env_or("MAX_DOCUMENT_BYTES", defaults.max_document_bytes),
        }
    }
}
