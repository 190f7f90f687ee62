//! The knowledge base facade.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use strata_common::config::DocumentParams;
use strata_common::{MetadataFilter, Result, ReturnMode, Segment, StrataError};
use strata_rse::{best_segments, relevance_values, MetaDocument, RseParamsInput};
use strata_store::MetadataStore;

use crate::components::{ComponentOverrides, Components};
use crate::ingest::{ingest_document, IngestOutcome};
use crate::progress::IngestProgress;
use crate::retrieve::ranked_results_for_queries;
use crate::segments::materialize_segment;

/// Descriptive configuration for a new knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub supp_id: String,
    /// Load the existing KB instead of failing when one with this id
    /// already exists.
    #[serde(default = "default_true")]
    pub exists_ok: bool,
}

fn default_language() -> String { "en".to_string() }
fn default_true() -> bool { true }

/// Pause inserted after each document on a batch-ingest worker.
pub const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(1);

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            language: default_language(),
            supp_id: String::new(),
            exists_ok: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KbMetadata {
    title: String,
    description: String,
    language: String,
    supp_id: String,
    created_on: i64,
}

/// A knowledge base: composed components plus persisted configuration.
pub struct KnowledgeBase {
    kb_id: String,
    metadata: KbMetadata,
    components: Components,
    metadata_store: Arc<dyn MetadataStore>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("kb_id", &self.kb_id)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Create a knowledge base, or load it when it already exists and
    /// `exists_ok` allows. On load, the supplied components override the
    /// stored records for every slot except the embedding model, which
    /// must match the vectors already in the store.
    pub async fn create(
        kb_id: &str,
        config: KbConfig,
        components: Components,
        metadata_store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        if metadata_store.kb_exists(kb_id).await? {
            if !config.exists_ok {
                return Err(StrataError::Validation(format!(
                    "knowledge base `{kb_id}` already exists"
                )));
            }
            let overrides = ComponentOverrides {
                llm: Some(Arc::clone(&components.llm)),
                reranker: Some(Arc::clone(&components.reranker)),
                vector_store: Some(Arc::clone(&components.vector_store)),
                chunk_store: Some(Arc::clone(&components.chunk_store)),
                file_system: Some(Arc::clone(&components.file_system)),
            };
            return Self::load(kb_id, metadata_store, overrides).await;
        }

        let kb = Self {
            kb_id: kb_id.to_string(),
            metadata: KbMetadata {
                title: config.title,
                description: config.description,
                language: config.language,
                supp_id: config.supp_id,
                created_on: chrono::Utc::now().timestamp(),
            },
            components,
            metadata_store,
        };
        kb.save().await?;
        info!(kb_id, "knowledge base created");
        Ok(kb)
    }

    /// Load a persisted knowledge base, re-hydrating its components from
    /// their records (with optional overrides).
    pub async fn load(
        kb_id: &str,
        metadata_store: Arc<dyn MetadataStore>,
        overrides: ComponentOverrides,
    ) -> Result<Self> {
        if !metadata_store.kb_exists(kb_id).await? {
            return Err(StrataError::Validation(format!(
                "knowledge base `{kb_id}` does not exist"
            )));
        }
        let data = metadata_store.load(kb_id).await?;
        let metadata: KbMetadata = serde_json::from_value(metadata_without_components(&data))?;
        let records = data
            .get("components")
            .ok_or_else(|| StrataError::Validation("metadata has no components".to_string()))?;
        let components = Components::from_records(records, overrides)?;

        Ok(Self {
            kb_id: kb_id.to_string(),
            metadata,
            components,
            metadata_store,
        })
    }

    /// Persist the KB metadata and component records.
    pub async fn save(&self) -> Result<()> {
        let mut data = serde_json::to_value(&self.metadata)?;
        data["components"] = self.components.to_records()?;
        self.metadata_store.save(&self.kb_id, &data).await
    }

    pub fn kb_id(&self) -> &str {
        &self.kb_id
    }

    pub fn language(&self) -> &str {
        &self.metadata.language
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    // ── Ingest ────────────────────────────────────────────────────────────

    /// Ingest one document.
    pub async fn add_document(&self, params: DocumentParams) -> Result<Option<IngestOutcome>> {
        self.add_document_with(params, &CancellationToken::new(), None)
            .await
    }

    /// Ingest one document with cancellation and progress reporting.
    ///
    /// Returns `Ok(None)` when the doc_id already exists (skipped with a
    /// warning, not an error).
    #[instrument(skip_all, fields(kb_id = %self.kb_id, doc_id = %params.doc_id))]
    pub async fn add_document_with(
        &self,
        params: DocumentParams,
        cancel: &CancellationToken,
        progress: Option<&broadcast::Sender<IngestProgress>>,
    ) -> Result<Option<IngestOutcome>> {
        if params.doc_id.is_empty() {
            return Err(StrataError::Validation("doc_id must not be empty".to_string()));
        }
        if params.doc_id.contains('/') {
            return Err(StrataError::Validation(format!(
                "doc_id `{}` must not contain '/'",
                params.doc_id
            )));
        }
        if params.text.is_empty() {
            return Err(StrataError::Validation("document text must not be empty".to_string()));
        }
        let existing = self.components.chunk_store.get_all_doc_ids().await?;
        if existing.contains(&params.doc_id) {
            warn!(doc_id = %params.doc_id, "document already exists, skipping");
            return Ok(None);
        }

        let outcome = ingest_document(
            &self.kb_id,
            &self.components,
            &params,
            &self.metadata.language,
            cancel,
            progress,
        )
        .await?;
        self.save().await?;
        Ok(Some(outcome))
    }

    /// Ingest a batch of documents over a worker pool.
    ///
    /// Per-document failures are logged and isolated; the returned list
    /// holds the successfully ingested doc_ids in completion order. A
    /// pause of `rate_limit_pause` follows every document on each worker.
    #[instrument(skip_all, fields(kb_id = %self.kb_id, n_docs = documents.len()))]
    pub async fn add_documents(
        &self,
        documents: Vec<DocumentParams>,
        max_workers: usize,
        rate_limit_pause: Duration,
    ) -> Vec<String> {
        let uploaded: Vec<Option<String>> = stream::iter(documents)
            .map(|params| async move {
                let doc_id = params.doc_id.clone();
                match self.add_document(params).await {
                    Ok(Some(_)) => {
                        tokio::time::sleep(rate_limit_pause).await;
                        Some(doc_id)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(doc_id = %doc_id, error = %e, "document ingest failed");
                        None
                    }
                }
            })
            .buffer_unordered(max_workers.max(1))
            .collect()
            .await;

        uploaded.into_iter().flatten().collect()
    }

    // ── Deletion ──────────────────────────────────────────────────────────

    /// Delete one document from every store. Retries once on partial
    /// failure; remaining residue is reported as a store error.
    pub async fn delete_document(&self, doc_id: &str) -> Result<()> {
        let mut residue: Vec<&str> = Vec::new();
        for attempt in 0..2 {
            residue.clear();
            if self.components.chunk_store.remove_document(doc_id).await.is_err() {
                residue.push("chunk store");
            }
            if self.components.vector_store.remove_document(doc_id).await.is_err() {
                residue.push("vector store");
            }
            if self
                .components
                .file_system
                .delete_directory(&self.kb_id, doc_id)
                .await
                .is_err()
            {
                residue.push("file system");
            }
            if residue.is_empty() {
                return Ok(());
            }
            warn!(doc_id, attempt, residue = ?residue, "partial document delete, retrying");
        }
        Err(StrataError::Store(format!(
            "document `{doc_id}` not fully deleted, residue in: {}",
            residue.join(", ")
        )))
    }

    /// Delete the knowledge base: every document, both stores, the KB
    /// file tree, and the metadata record.
    pub async fn delete(self) -> Result<()> {
        for doc_id in self.components.chunk_store.get_all_doc_ids().await? {
            self.delete_document(&doc_id).await?;
        }
        self.components.chunk_store.delete().await?;
        self.components.vector_store.delete().await?;
        self.components.file_system.delete_kb(&self.kb_id).await?;
        self.metadata_store.delete(&self.kb_id).await?;
        info!(kb_id = %self.kb_id, "knowledge base deleted");
        Ok(())
    }

    // ── Query ─────────────────────────────────────────────────────────────

    /// Retrieve the most relevant segments for a query set.
    pub async fn query(
        &self,
        queries: &[String],
        rse_params: RseParamsInput,
        metadata_filter: Option<&MetadataFilter>,
        return_mode: ReturnMode,
    ) -> Result<Vec<Segment>> {
        self.query_with(
            queries,
            rse_params,
            metadata_filter,
            return_mode,
            &CancellationToken::new(),
        )
        .await
    }

    /// As [`KnowledgeBase::query`], checking `cancel` between pipeline
    /// stages. A cancelled query returns early with no side effects.
    #[instrument(skip_all, fields(kb_id = %self.kb_id, n_queries = queries.len()))]
    pub async fn query_with(
        &self,
        queries: &[String],
        rse_params: RseParamsInput,
        metadata_filter: Option<&MetadataFilter>,
        return_mode: ReturnMode,
        cancel: &CancellationToken,
    ) -> Result<Vec<Segment>> {
        let params = rse_params.resolve()?;
        if queries.is_empty() {
            return Ok(vec![]);
        }
        if cancel.is_cancelled() {
            return Err(StrataError::Cancelled);
        }

        // ── Search and rerank, one pipeline per query ─────────────────────
        let all_ranked =
            ranked_results_for_queries(&self.components, queries, metadata_filter).await?;
        if cancel.is_cancelled() {
            return Err(StrataError::Cancelled);
        }

        // ── Meta-document over the candidate documents ────────────────────
        let mut chunk_counts: BTreeMap<String, u32> = BTreeMap::new();
        for list in &all_ranked {
            for hit in list.iter().take(params.top_k_for_document_selection) {
                if !chunk_counts.contains_key(&hit.doc_id) {
                    let count = self.components.chunk_store.count_chunks(&hit.doc_id).await?;
                    chunk_counts.insert(hit.doc_id.clone(), count);
                }
            }
        }
        let meta = MetaDocument::build(&all_ranked, params.top_k_for_document_selection, &chunk_counts);
        if meta.is_empty() {
            info!("query matched no documents");
            return Ok(vec![]);
        }

        // ── Relevance synthesis and segment selection ─────────────────────
        let chunk_lengths = if params.chunk_length_adjustment {
            let mut lengths = Vec::with_capacity(meta.len());
            for doc_index in 0..meta.doc_count() {
                lengths.extend(
                    self.components
                        .chunk_store
                        .get_chunk_lengths(meta.doc_id(doc_index))
                        .await?,
                );
            }
            if lengths.len() == meta.len() {
                Some(lengths)
            } else {
                warn!("chunk lengths out of sync with meta-document, skipping adjustment");
                None
            }
        } else {
            None
        };
        let values = relevance_values(&all_ranked, &meta, &params, chunk_lengths.as_deref());
        let overall = params.effective_overall_max_length(queries.len());
        let selected = best_segments(&values, &meta, &params, overall);

        if cancel.is_cancelled() {
            return Err(StrataError::Cancelled);
        }

        // ── Materialize ───────────────────────────────────────────────────
        let mut segments = Vec::with_capacity(selected.len());
        for scored in &selected {
            segments.push(
                materialize_segment(&self.kb_id, &self.components, &meta, scored, return_mode)
                    .await?,
            );
        }
        info!(n_segments = segments.len(), "query complete");
        Ok(segments)
    }
}

/// The metadata document minus its `components` field.
fn metadata_without_components(data: &serde_json::Value) -> serde_json::Value {
    let mut clone = data.clone();
    if let Some(map) = clone.as_object_mut() {
        map.remove("components");
    }
    clone
}
