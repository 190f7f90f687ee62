//! Vector store.
//!
//! `BasicVectorStore` holds L2-normalized vectors in memory and scores
//! queries by brute-force inner product, persisting its state as JSON.
//! Suitable for KBs up to a few hundred thousand chunks; larger corpora
//! should plug in an ANN-backed implementation of the trait.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use strata_common::{
    ComponentRecord, MetadataFilter, MetadataValue, RankedResult, Result, StrataError,
    VectorRecord,
};

/// Reserved metadata key under which the chunk's embedding text is stored,
/// so search hits can carry it to the reranker.
pub const CHUNK_TEXT_KEY: &str = "chunk_text";

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records, replacing any existing `(doc_id, chunk_index)` pairs.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Top-k inner-product search with an optional metadata filter.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RankedResult>>;

    async fn remove_document(&self, doc_id: &str) -> Result<()>;

    /// Remove the store and its on-disk state entirely.
    async fn delete(&self) -> Result<()>;

    fn to_record(&self) -> ComponentRecord;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BasicVectorStoreParams {
    kb_id: String,
    storage_directory: PathBuf,
}

/// Brute-force local vector store.
pub struct BasicVectorStore {
    params: BasicVectorStoreParams,
    records: RwLock<Vec<VectorRecord>>,
}

impl BasicVectorStore {
    pub fn new(kb_id: &str, storage_directory: &std::path::Path) -> Result<Self> {
        let params = BasicVectorStoreParams {
            kb_id: kb_id.to_string(),
            storage_directory: storage_directory.to_path_buf(),
        };
        let records = match std::fs::read(params_path(&params)) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { params, records: RwLock::new(records) })
    }

    async fn persist(&self, records: &[VectorRecord]) -> Result<()> {
        let path = params_path(&self.params);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(records)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}

fn params_path(params: &BasicVectorStoreParams) -> PathBuf {
    params
        .storage_directory
        .join("vector_storage")
        .join(format!("{}.json", params.kb_id))
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn hit_text(metadata: &BTreeMap<String, MetadataValue>) -> Option<String> {
    match metadata.get(CHUNK_TEXT_KEY) {
        Some(MetadataValue::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl VectorStore for BasicVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut guard = self.records.write().await;
        guard.retain(|existing| {
            !records
                .iter()
                .any(|r| r.doc_id == existing.doc_id && r.chunk_index == existing.chunk_index)
        });
        guard.extend(records);
        self.persist(&guard).await?;
        debug!(kb_id = %self.params.kb_id, total = guard.len(), "vector store upsert");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RankedResult>> {
        let guard = self.records.read().await;
        let mut scored: Vec<(f32, &VectorRecord)> = guard
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| (inner_product(query, &r.vector), r))
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.doc_id.cmp(&b.1.doc_id))
                .then_with(|| a.1.chunk_index.cmp(&b.1.chunk_index))
        });
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, r)| RankedResult {
                doc_id: r.doc_id.clone(),
                chunk_index: r.chunk_index,
                similarity: score,
                text: hit_text(&r.metadata),
            })
            .collect())
    }

    async fn remove_document(&self, doc_id: &str) -> Result<()> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|r| r.doc_id != doc_id);
        if guard.len() != before {
            self.persist(&guard).await?;
        }
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        let mut guard = self.records.write().await;
        guard.clear();
        match tokio::fs::remove_file(params_path(&self.params)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new(
            "BasicVectorStore",
            serde_json::to_value(&self.params).unwrap_or(Value::Null),
        )
    }
}

/// Re-hydrate a vector store from a persisted record.
pub fn from_record(record: &ComponentRecord) -> Result<Arc<dyn VectorStore>> {
    match record.subclass_name.as_str() {
        "BasicVectorStore" => {
            let params: BasicVectorStoreParams = serde_json::from_value(record.params.clone())?;
            Ok(Arc::new(BasicVectorStore::new(
                &params.kb_id,
                &params.storage_directory,
            )?))
        }
        other => Err(StrataError::UnknownComponent(format!("vector store `{other}`"))),
    }
}
