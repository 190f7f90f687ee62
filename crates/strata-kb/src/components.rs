//! The composed component set of a knowledge base, and its persistence.
//!
//! Components serialize as a map of tagged records and re-hydrate by
//! dispatching on each tag. On load, callers may override every slot
//! except the embedding model — vectors already in the store were
//! produced by the persisted model, and a different one would make
//! similarities meaningless.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use strata_common::{Result, StrataError};
use strata_providers::{
    embedding, llm, reranker, EmbeddingModel, LlmProvider, Reranker,
};
use strata_store::{chunk, file_system, vector, ChunkStore, FileSystem, VectorStore};

#[derive(Clone)]
pub struct Components {
    pub llm: Arc<dyn LlmProvider>,
    pub embedding: Arc<dyn EmbeddingModel>,
    pub reranker: Arc<dyn Reranker>,
    pub vector_store: Arc<dyn VectorStore>,
    pub chunk_store: Arc<dyn ChunkStore>,
    pub file_system: Arc<dyn FileSystem>,
}

/// Optional component replacements applied when loading a persisted KB.
#[derive(Clone, Default)]
pub struct ComponentOverrides {
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub vector_store: Option<Arc<dyn VectorStore>>,
    pub chunk_store: Option<Arc<dyn ChunkStore>>,
    pub file_system: Option<Arc<dyn FileSystem>>,
}

impl Components {
    /// Default component set: OpenAI-compatible providers plus local
    /// stores under `storage_directory`.
    pub fn local_defaults(kb_id: &str, storage_directory: &Path) -> Result<Self> {
        Ok(Self {
            llm: Arc::new(llm::OpenAiCompatChat::new(Default::default())),
            embedding: Arc::new(embedding::OpenAiCompatEmbedding::new(Default::default())),
            reranker: Arc::new(reranker::ApiReranker::new(Default::default())),
            vector_store: Arc::new(vector::BasicVectorStore::new(kb_id, storage_directory)?),
            chunk_store: Arc::new(chunk::BasicChunkStore::new(kb_id, storage_directory)?),
            file_system: Arc::new(file_system::LocalFileSystem::new(
                &storage_directory.join("page_images"),
            )),
        })
    }

    /// Serialize every component to its tagged record.
    pub fn to_records(&self) -> Result<Value> {
        Ok(json!({
            "auto_context_model": self.llm.to_record(),
            "embedding_model": self.embedding.to_record(),
            "reranker": self.reranker.to_record(),
            "vector_db": self.vector_store.to_record(),
            "chunk_db": self.chunk_store.to_record(),
            "file_system": self.file_system.to_record(),
        }))
    }

    /// Re-hydrate a component set from persisted records, applying
    /// overrides. Unknown record tags are rejected.
    pub fn from_records(records: &Value, overrides: ComponentOverrides) -> Result<Self> {
        let llm = match overrides.llm {
            Some(provided) => {
                warn!("overriding stored auto-context model");
                provided
            }
            None => llm::from_record(&parse_record(records, "auto_context_model")?)?,
        };
        let embedding =
            embedding::from_record(&parse_record(records, "embedding_model")?)?;
        let reranker = match overrides.reranker {
            Some(provided) => {
                warn!("overriding stored reranker");
                provided
            }
            None => reranker::from_record(&parse_record(records, "reranker")?)?,
        };
        let vector_store = match overrides.vector_store {
            Some(provided) => {
                warn!("overriding stored vector store");
                provided
            }
            None => vector::from_record(&parse_record(records, "vector_db")?)?,
        };
        let chunk_store = match overrides.chunk_store {
            Some(provided) => {
                warn!("overriding stored chunk store");
                provided
            }
            None => chunk::from_record(&parse_record(records, "chunk_db")?)?,
        };
        let file_system = match overrides.file_system {
            Some(provided) => {
                warn!("overriding stored file system");
                provided
            }
            None => file_system::from_record(&parse_record(records, "file_system")?)?,
        };

        Ok(Self { llm, embedding, reranker, vector_store, chunk_store, file_system })
    }
}

fn parse_record(records: &Value, key: &str) -> Result<strata_common::ComponentRecord> {
    let value = records
        .get(key)
        .ok_or_else(|| StrataError::Validation(format!("metadata is missing component `{key}`")))?;
    Ok(serde_json::from_value(value.clone())?)
}
