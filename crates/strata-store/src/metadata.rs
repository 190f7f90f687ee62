//! Knowledge base metadata storage.
//!
//! One JSON document per KB holding its descriptive fields and the tagged
//! component records needed to re-hydrate providers and stores.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use strata_common::Result;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn save(&self, kb_id: &str, data: &Value) -> Result<()>;

    /// Load a KB's metadata document. Errors when the KB does not exist;
    /// check with [`MetadataStore::kb_exists`] first.
    async fn load(&self, kb_id: &str) -> Result<Value>;

    async fn kb_exists(&self, kb_id: &str) -> Result<bool>;

    async fn delete(&self, kb_id: &str) -> Result<()>;
}

/// Metadata storage as JSON files under `<storage_directory>/metadata/`.
pub struct LocalMetadataStore {
    storage_directory: PathBuf,
}

impl LocalMetadataStore {
    pub fn new(storage_directory: &Path) -> Self {
        Self { storage_directory: storage_directory.to_path_buf() }
    }

    fn path(&self, kb_id: &str) -> PathBuf {
        self.storage_directory.join("metadata").join(format!("{kb_id}.json"))
    }
}

#[async_trait]
impl MetadataStore for LocalMetadataStore {
    async fn save(&self, kb_id: &str, data: &Value) -> Result<()> {
        let path = self.path(kb_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn load(&self, kb_id: &str) -> Result<Value> {
        let bytes = tokio::fs::read(self.path(kb_id)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn kb_exists(&self, kb_id: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path(kb_id)).await?)
    }

    async fn delete(&self, kb_id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(kb_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
