//! Page-image and artifact storage.
//!
//! The file system keeps per-document artifacts (parsed element dumps,
//! rendered page images) outside the chunk and vector stores. Page images
//! are named `page_<n>.jpg` (or `.png`) under
//! `<base>/<kb_id>/<doc_id>/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_common::{ComponentRecord, Result, StrataError};

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Store a named JSON artifact for a document.
    async fn save_data(&self, kb_id: &str, doc_id: &str, name: &str, data: &Value) -> Result<()>;

    /// Load a named JSON artifact; `None` when absent.
    async fn load_data(&self, kb_id: &str, doc_id: &str, name: &str) -> Result<Option<Value>>;

    /// Paths of the page images covering `page_start..=page_end`, in page
    /// order. Missing pages are skipped; an empty result means the
    /// document has no images in that range.
    async fn get_files(
        &self,
        kb_id: &str,
        doc_id: &str,
        page_start: u32,
        page_end: u32,
    ) -> Result<Vec<PathBuf>>;

    /// Remove one document's artifact directory. Idempotent.
    async fn delete_directory(&self, kb_id: &str, doc_id: &str) -> Result<()>;

    /// Remove everything stored for a knowledge base. Idempotent.
    async fn delete_kb(&self, kb_id: &str) -> Result<()>;

    fn to_record(&self) -> ComponentRecord;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalFileSystemParams {
    base_path: PathBuf,
}

/// Artifact storage on the local disk.
pub struct LocalFileSystem {
    params: LocalFileSystemParams,
}

impl LocalFileSystem {
    pub fn new(base_path: &Path) -> Self {
        Self {
            params: LocalFileSystemParams { base_path: base_path.to_path_buf() },
        }
    }

    fn doc_dir(&self, kb_id: &str, doc_id: &str) -> PathBuf {
        self.params.base_path.join(kb_id).join(doc_id)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn save_data(&self, kb_id: &str, doc_id: &str, name: &str, data: &Value) -> Result<()> {
        let dir = self.doc_dir(kb_id, doc_id);
        tokio::fs::create_dir_all(&dir).await?;
        let bytes = serde_json::to_vec(data)?;
        tokio::fs::write(dir.join(format!("{name}.json")), bytes).await?;
        Ok(())
    }

    async fn load_data(&self, kb_id: &str, doc_id: &str, name: &str) -> Result<Option<Value>> {
        let path = self.doc_dir(kb_id, doc_id).join(format!("{name}.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_files(
        &self,
        kb_id: &str,
        doc_id: &str,
        page_start: u32,
        page_end: u32,
    ) -> Result<Vec<PathBuf>> {
        let dir = self.doc_dir(kb_id, doc_id);
        let mut paths = Vec::new();
        for page in page_start..=page_end {
            for ext in ["jpg", "png"] {
                let candidate = dir.join(format!("page_{page}.{ext}"));
                if tokio::fs::try_exists(&candidate).await? {
                    paths.push(candidate);
                    break;
                }
            }
        }
        Ok(paths)
    }

    async fn delete_directory(&self, kb_id: &str, doc_id: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.doc_dir(kb_id, doc_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_kb(&self, kb_id: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.params.base_path.join(kb_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new(
            "LocalFileSystem",
            serde_json::to_value(&self.params).unwrap_or(Value::Null),
        )
    }
}

/// Re-hydrate a file system from a persisted record.
pub fn from_record(record: &ComponentRecord) -> Result<Arc<dyn FileSystem>> {
    match record.subclass_name.as_str() {
        "LocalFileSystem" => {
            let params: LocalFileSystemParams = serde_json::from_value(record.params.clone())?;
            Ok(Arc::new(LocalFileSystem::new(&params.base_path)))
        }
        other => Err(StrataError::UnknownComponent(format!("file system `{other}`"))),
    }
}
