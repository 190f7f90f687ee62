//! Chunk store.
//!
//! Holds the displayable chunk text and per-document metadata (title,
//! summary, page ranges, visual flags) keyed by `(doc_id, chunk_index)`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use strata_common::{Chunk, ComponentRecord, DocumentRecord, Result, StrataError};

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store a document record and its chunks. Replaces any existing
    /// entry for the same `doc_id`.
    async fn put_chunks(&self, doc: &DocumentRecord, chunks: &[Chunk]) -> Result<()>;

    async fn get_chunk_text(&self, doc_id: &str, chunk_index: u32) -> Result<Option<String>>;

    /// `(page_start, page_end)` for one chunk; `None` entries when the
    /// parser supplied no page information.
    async fn get_chunk_page_numbers(
        &self,
        doc_id: &str,
        chunk_index: u32,
    ) -> Result<(Option<u32>, Option<u32>)>;

    async fn get_is_visual(&self, doc_id: &str, chunk_index: u32) -> Result<bool>;

    async fn get_document_title(&self, doc_id: &str) -> Result<Option<String>>;

    async fn get_document_summary(&self, doc_id: &str) -> Result<Option<String>>;

    async fn get_all_doc_ids(&self) -> Result<Vec<String>>;

    /// Number of chunks stored for a document; 0 when unknown.
    async fn count_chunks(&self, doc_id: &str) -> Result<u32>;

    /// Content length in bytes of every chunk of a document, in
    /// chunk-index order.
    async fn get_chunk_lengths(&self, doc_id: &str) -> Result<Vec<u32>>;

    async fn remove_document(&self, doc_id: &str) -> Result<()>;

    /// Remove the store and its on-disk state entirely.
    async fn delete(&self) -> Result<()>;

    fn to_record(&self) -> ComponentRecord;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    content: String,
    section_index: u32,
    section_title: String,
    page_start: Option<u32>,
    page_end: Option<u32>,
    is_visual: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    record: DocumentRecord,
    chunks: BTreeMap<u32, StoredChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BasicChunkStoreParams {
    kb_id: String,
    storage_directory: PathBuf,
}

/// Local chunk store, persisted as one JSON document per KB.
pub struct BasicChunkStore {
    params: BasicChunkStoreParams,
    state: RwLock<HashMap<String, DocEntry>>,
}

impl BasicChunkStore {
    pub fn new(kb_id: &str, storage_directory: &std::path::Path) -> Result<Self> {
        let params = BasicChunkStoreParams {
            kb_id: kb_id.to_string(),
            storage_directory: storage_directory.to_path_buf(),
        };
        let state = match std::fs::read(params_path(&params)) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { params, state: RwLock::new(state) })
    }

    async fn persist(&self, state: &HashMap<String, DocEntry>) -> Result<()> {
        let path = params_path(&self.params);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(state)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn with_chunk<T>(
        &self,
        doc_id: &str,
        chunk_index: u32,
        f: impl FnOnce(&StoredChunk) -> T,
    ) -> Option<T> {
        let guard = self.state.read().await;
        guard
            .get(doc_id)
            .and_then(|entry| entry.chunks.get(&chunk_index))
            .map(f)
    }
}

fn params_path(params: &BasicChunkStoreParams) -> PathBuf {
    params
        .storage_directory
        .join("chunk_storage")
        .join(format!("{}.json", params.kb_id))
}

#[async_trait]
impl ChunkStore for BasicChunkStore {
    async fn put_chunks(&self, doc: &DocumentRecord, chunks: &[Chunk]) -> Result<()> {
        let mut stored = BTreeMap::new();
        for chunk in chunks {
            stored.insert(
                chunk.chunk_index,
                StoredChunk {
                    content: chunk.content.clone(),
                    section_index: chunk.section_index,
                    section_title: chunk.section_title.clone(),
                    page_start: chunk.page_start,
                    page_end: chunk.page_end,
                    is_visual: chunk.is_visual,
                },
            );
        }
        let mut guard = self.state.write().await;
        guard.insert(doc.doc_id.clone(), DocEntry { record: doc.clone(), chunks: stored });
        self.persist(&guard).await?;
        debug!(kb_id = %self.params.kb_id, doc_id = %doc.doc_id, n = chunks.len(), "chunks stored");
        Ok(())
    }

    async fn get_chunk_text(&self, doc_id: &str, chunk_index: u32) -> Result<Option<String>> {
        Ok(self.with_chunk(doc_id, chunk_index, |c| c.content.clone()).await)
    }

    async fn get_chunk_page_numbers(
        &self,
        doc_id: &str,
        chunk_index: u32,
    ) -> Result<(Option<u32>, Option<u32>)> {
        Ok(self
            .with_chunk(doc_id, chunk_index, |c| (c.page_start, c.page_end))
            .await
            .unwrap_or((None, None)))
    }

    async fn get_is_visual(&self, doc_id: &str, chunk_index: u32) -> Result<bool> {
        Ok(self.with_chunk(doc_id, chunk_index, |c| c.is_visual).await.unwrap_or(false))
    }

    async fn get_document_title(&self, doc_id: &str) -> Result<Option<String>> {
        let guard = self.state.read().await;
        Ok(guard.get(doc_id).map(|e| e.record.title.clone()))
    }

    async fn get_document_summary(&self, doc_id: &str) -> Result<Option<String>> {
        let guard = self.state.read().await;
        Ok(guard.get(doc_id).map(|e| e.record.summary.clone()))
    }

    async fn get_all_doc_ids(&self) -> Result<Vec<String>> {
        let guard = self.state.read().await;
        let mut ids: Vec<String> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn count_chunks(&self, doc_id: &str) -> Result<u32> {
        let guard = self.state.read().await;
        Ok(guard.get(doc_id).map_or(0, |e| e.chunks.len() as u32))
    }

    async fn get_chunk_lengths(&self, doc_id: &str) -> Result<Vec<u32>> {
        let guard = self.state.read().await;
        Ok(guard
            .get(doc_id)
            .map(|e| e.chunks.values().map(|c| c.content.len() as u32).collect())
            .unwrap_or_default())
    }

    async fn remove_document(&self, doc_id: &str) -> Result<()> {
        let mut guard = self.state.write().await;
        if guard.remove(doc_id).is_some() {
            self.persist(&guard).await?;
        }
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        guard.clear();
        match tokio::fs::remove_file(params_path(&self.params)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new(
            "BasicChunkStore",
            serde_json::to_value(&self.params).unwrap_or(Value::Null),
        )
    }
}

/// Re-hydrate a chunk store from a persisted record.
pub fn from_record(record: &ComponentRecord) -> Result<Arc<dyn ChunkStore>> {
    match record.subclass_name.as_str() {
        "BasicChunkStore" => {
            let params: BasicChunkStoreParams = serde_json::from_value(record.params.clone())?;
            Ok(Arc::new(BasicChunkStore::new(
                &params.kb_id,
                &params.storage_directory,
            )?))
        }
        other => Err(StrataError::UnknownComponent(format!("chunk store `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(doc_id: &str) -> DocumentRecord {
        DocumentRecord {
            doc_id: doc_id.to_string(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            supp_id: String::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    fn chunk(doc_id: &str, index: u32, content: &str) -> Chunk {
        Chunk {
            doc_id: doc_id.to_string(),
            chunk_index: index,
            section_index: 0,
            section_title: "Intro".to_string(),
            content: content.to_string(),
            embedding_text: content.to_string(),
            page_start: None,
            page_end: None,
            is_visual: false,
        }
    }

    #[tokio::test]
    async fn test_put_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = BasicChunkStore::new("kb", dir.path()).unwrap();
        store
            .put_chunks(&doc("d1"), &[chunk("d1", 0, "first"), chunk("d1", 1, "second")])
            .await
            .unwrap();

        assert_eq!(store.get_chunk_text("d1", 1).await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.count_chunks("d1").await.unwrap(), 2);
        assert_eq!(store.get_chunk_lengths("d1").await.unwrap(), vec![5, 6]);
        assert_eq!(store.get_document_title("d1").await.unwrap().as_deref(), Some("Title"));
        assert!(store.get_chunk_text("d1", 7).await.unwrap().is_none());
        assert!(store.get_chunk_text("missing", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_document_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = BasicChunkStore::new("kb", dir.path()).unwrap();
        store.put_chunks(&doc("d1"), &[chunk("d1", 0, "only")]).await.unwrap();

        store.remove_document("d1").await.unwrap();
        store.remove_document("d1").await.unwrap();
        assert!(store.get_all_doc_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = BasicChunkStore::new("kb", dir.path()).unwrap();
            store.put_chunks(&doc("d1"), &[chunk("d1", 0, "persisted")]).await.unwrap();
        }
        let store = BasicChunkStore::new("kb", dir.path()).unwrap();
        assert_eq!(
            store.get_chunk_text("d1", 0).await.unwrap().as_deref(),
            Some("persisted")
        );
    }
}
