//! Filesystem document store.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use common::{AppError, AppResult};

use super::{DocumentMetadata, DocumentStore};

/// Writes each document to `<root>/<document type>/<uuid>`.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference inside the root, refusing anything that could escape it.
    fn resolve(&self, storage_ref: &str) -> AppResult<PathBuf> {
        let valid = !storage_ref.is_empty()
            && storage_ref.split('/').count() == 2
            && storage_ref
                .split('/')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        if !valid {
            return Err(AppError::validation("Malformed document reference"));
        }
        Ok(self.root.join(storage_ref))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn store(&self, bytes: Vec<u8>, metadata: &DocumentMetadata) -> AppResult<String> {
        let storage_ref = format!("{}/{}", metadata.document_type, Uuid::new_v4());
        let path = self.resolve(&storage_ref)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| AppError::internal(format!("Failed to create document directory: {}", e)))?;
        }
        fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::internal(format!("Failed to write document: {}", e)))?;

        info!(
            storage_ref = %storage_ref,
            owner = %metadata.owner,
            content_type = %metadata.content_type,
            size = bytes.len(),
            "Document stored"
        );
        Ok(storage_ref)
    }

    async fn fetch(&self, storage_ref: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(storage_ref)?;
        debug!(storage_ref, "Reading document");
        fs::read(&path).await.map_err(|e| match e.kind() {
            IoErrorKind::NotFound => AppError::NotFound,
            _ => AppError::internal(format!("Failed to read document: {}", e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DocumentType;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            owner: "hr@acme.com".into(),
            document_type: DocumentType::TaxIdentification,
            file_name: "tax.pdf".into(),
            content_type: "application/pdf".into(),
        }
    }

    #[tokio::test]
    async fn stores_and_fetches_bytes() {
        let root = std::env::temp_dir().join(format!("documents-{}", Uuid::new_v4()));
        let store = LocalDocumentStore::new(&root);

        let storage_ref = store.store(b"%PDF-1.7".to_vec(), &metadata()).await.unwrap();
        assert!(storage_ref.starts_with("tax_identification/"));
        assert_eq!(store.fetch(&storage_ref).await.unwrap(), b"%PDF-1.7".to_vec());

        fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_references_outside_the_root() {
        let store = LocalDocumentStore::new(std::env::temp_dir());
        for bad in ["../etc/passwd", "/etc/passwd", "a/../../b", "only-one-part", ""] {
            let err = store.fetch(bad).await.unwrap_err();
            assert_eq!(err.code(), "validation-error", "reference {bad:?}");
        }
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let store = LocalDocumentStore::new(std::env::temp_dir());
        let err = store
            .fetch(&format!("other/{}", Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }
}
