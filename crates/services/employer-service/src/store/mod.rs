//! Document store contract.
//!
//! The data model only ever holds the opaque reference returned by `store`.

mod local;

pub use local::LocalDocumentStore;

use async_trait::async_trait;

use common::AppResult;
use domain::DocumentType;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// What the store is told about a document besides its bytes.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub owner: String,
    pub document_type: DocumentType,
    pub file_name: String,
    pub content_type: String,
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist the bytes and return a storage reference.
    async fn store(&self, bytes: Vec<u8>, metadata: &DocumentMetadata) -> AppResult<String>;

    /// Read back the bytes behind a reference.
    async fn fetch(&self, storage_ref: &str) -> AppResult<Vec<u8>>;
}
