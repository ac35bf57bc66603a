//! Tenant asset storage behind a trait seam. The crate ships the local
//! filesystem backend; an object store fills the same contract in
//! deployments that configure one.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Asset I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Logo,
    Favicon,
    LoginBackground,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Logo => "logo",
            AssetKind::Favicon => "favicon",
            AssetKind::LoginBackground => "login_background",
        }
    }
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Create the tenant's asset namespace (directory or key prefix).
    async fn create_namespace(&self, slug: &str) -> Result<(), StorageError>;

    /// Store one asset and return the path it is reachable under.
    async fn write_asset(
        &self,
        slug: &str,
        file_name: &str,
        bytes: &[u8],
        kind: AssetKind,
    ) -> Result<String, StorageError>;
}

pub struct LocalAssetStore {
    root: PathBuf,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn create_namespace(&self, slug: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.root.join(slug)).await?;
        Ok(())
    }

    async fn write_asset(
        &self,
        slug: &str,
        file_name: &str,
        bytes: &[u8],
        kind: AssetKind,
    ) -> Result<String, StorageError> {
        let dir = self.root.join(slug);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}_{}", kind.as_str(), file_name));
        tokio::fs::write(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Build the asset store selected by configuration.
pub fn build_asset_store(storage: &StorageConfig) -> Result<Arc<dyn AssetStore>, StorageError> {
    match storage {
        StorageConfig::Local { root } => Ok(Arc::new(LocalAssetStore::new(root))),
        StorageConfig::S3 { bucket, .. } => Err(StorageError::UnsupportedBackend(format!(
            "object-store backend (bucket '{}') is not bundled with this build",
            bucket
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_assets_under_tenant_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());

        store.create_namespace("acme").await.unwrap();
        let path = store
            .write_asset("acme", "brand.png", b"png-bytes", AssetKind::Logo)
            .await
            .unwrap();

        assert!(path.contains("acme"));
        assert!(path.ends_with("logo_brand.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn namespace_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalAssetStore::new(dir.path());

        store.create_namespace("acme").await.unwrap();
        store.create_namespace("acme").await.unwrap();
    }
}
