//! End-to-end knowledge base tests with scripted providers and
//! tempdir-backed stores.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use strata_common::config::{AutoContextConfig, DocumentParams};
use strata_common::{
    ComponentRecord, MetadataFilter, RankedResult, Result, ReturnMode, SegmentContent,
    StrataError, VectorRecord,
};
use strata_kb::{Components, IngestStage, KbConfig, KnowledgeBase};
use strata_providers::{NoopReranker, Reranker};
use strata_rse::{RseParamsInput, RseParamsUpdate};
use strata_store::{
    BasicChunkStore, BasicVectorStore, LocalFileSystem, LocalMetadataStore, VectorStore,
};
use strata_test_utils::{
    sample_paper_sections, FixedSimilarityReranker, HashEmbedding, ScriptedLlm, SAMPLE_PAPER,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn components_with(
    dir: &std::path::Path,
    kb_id: &str,
    llm: Arc<ScriptedLlm>,
    reranker: Arc<dyn Reranker>,
) -> Components {
    Components {
        llm,
        embedding: Arc::new(HashEmbedding::new(128)),
        reranker,
        vector_store: Arc::new(BasicVectorStore::new(kb_id, dir).unwrap()),
        chunk_store: Arc::new(BasicChunkStore::new(kb_id, dir).unwrap()),
        file_system: Arc::new(LocalFileSystem::new(&dir.join("page_images"))),
    }
}

async fn make_kb(dir: &std::path::Path, kb_id: &str, reranker: Arc<dyn Reranker>) -> KnowledgeBase {
    init_tracing();
    let llm = Arc::new(ScriptedLlm::with_sections(sample_paper_sections()));
    let components = components_with(dir, kb_id, llm, reranker);
    let metadata_store = Arc::new(LocalMetadataStore::new(dir));
    KnowledgeBase::create(kb_id, KbConfig::default(), components, metadata_store)
        .await
        .unwrap()
}

fn paper_params(doc_id: &str) -> DocumentParams {
    DocumentParams {
        doc_id: doc_id.to_string(),
        text: SAMPLE_PAPER.to_string(),
        document_title: "AI in Healthcare".to_string(),
        auto_context: AutoContextConfig {
            get_document_summary: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn loose_rse(max_length: usize, overall_max_length: usize) -> RseParamsInput {
    RseParamsInput::Update(RseParamsUpdate {
        max_length: Some(max_length),
        overall_max_length: Some(overall_max_length),
        minimum_value: Some(0.01),
        irrelevant_chunk_penalty: Some(0.05),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_ingest_then_query_returns_text_segments() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;

    let outcome = kb.add_document(paper_params("paper")).await.unwrap().unwrap();
    assert_eq!(outcome.n_sections, 4);
    assert!(outcome.n_chunks >= 4);

    let segments = kb
        .query(
            &["diagnostic accuracy of AI systems".to_string()],
            loose_rse(5, 20),
            None,
            ReturnMode::Text,
        )
        .await
        .unwrap();

    assert!(!segments.is_empty());
    for segment in &segments {
        assert_eq!(segment.doc_id, "paper");
        assert!(segment.chunk_end > segment.chunk_start);
        assert!((segment.chunk_end - segment.chunk_start) as usize <= 5);
        let text = segment.content.as_text().expect("text mode");
        assert!(text.starts_with("AI in Healthcare"), "segment carries the header");
    }
    // Descending score order.
    for pair in segments.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_multi_query_budgets_and_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let reranker = Arc::new(FixedSimilarityReranker::new(&[("doc-a", 0.9), ("doc-b", 0.8)]));
    let kb = make_kb(dir.path(), "kb", reranker).await;

    let mut a = paper_params("doc-a");
    a.document_title = "Document A".to_string();
    let mut b = paper_params("doc-b");
    b.document_title = "Document B".to_string();
    kb.add_document(a).await.unwrap();
    kb.add_document(b).await.unwrap();

    let rse = RseParamsInput::Update(RseParamsUpdate {
        max_length: Some(3),
        overall_max_length: Some(5),
        overall_max_length_extension: Some(5),
        minimum_value: Some(0.1),
        irrelevant_chunk_penalty: Some(0.05),
        ..Default::default()
    });
    let queries = vec!["first question".to_string(), "second question".to_string()];
    let segments = kb.query(&queries, rse, None, ReturnMode::Text).await.unwrap();

    assert!(segments.len() >= 2);
    // Budget: overall 5 + extension 5 for the second query.
    let total: u32 = segments.iter().map(|s| s.chunk_end - s.chunk_start).sum();
    assert!(total <= 10);
    for segment in &segments {
        assert!(segment.chunk_end - segment.chunk_start <= 3);
    }
    for pair in segments.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    // The higher-similarity document wins the first segment.
    assert_eq!(segments[0].doc_id, "doc-a");

    // Segments are pairwise disjoint within each document.
    for (i, a) in segments.iter().enumerate() {
        for b in segments.iter().skip(i + 1) {
            if a.doc_id == b.doc_id {
                assert!(a.chunk_end <= b.chunk_start || b.chunk_end <= a.chunk_start);
            }
        }
    }
}

#[tokio::test]
async fn test_page_images_mode_falls_back_to_text() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;
    kb.add_document(paper_params("paper")).await.unwrap();

    let segments = kb
        .query(
            &["AI accuracy".to_string()],
            loose_rse(5, 20),
            None,
            ReturnMode::PageImages,
        )
        .await
        .unwrap();

    assert!(!segments.is_empty());
    for segment in &segments {
        assert!(matches!(segment.content, SegmentContent::Text(_)));
        assert_eq!(segment.segment_page_start, None);
        assert_eq!(segment.segment_page_end, None);
    }
}

#[tokio::test]
async fn test_query_on_empty_kb_returns_no_segments() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;
    let segments = kb
        .query(&["anything".to_string()], RseParamsInput::default(), None, ReturnMode::Text)
        .await
        .unwrap();
    assert!(segments.is_empty());
}

#[tokio::test]
async fn test_unknown_preset_is_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;
    let err = kb
        .query(
            &["q".to_string()],
            RseParamsInput::Preset("aggressive".to_string()),
            None,
            ReturnMode::Text,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Validation(_)));
}

#[tokio::test]
async fn test_validation_rejects_bad_doc_ids() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;

    let mut params = paper_params("a/b");
    let err = kb.add_document(params.clone()).await.unwrap_err();
    assert!(matches!(err, StrataError::Validation(_)));

    params.doc_id = "ok".to_string();
    params.text = String::new();
    let err = kb.add_document(params).await.unwrap_err();
    assert!(matches!(err, StrataError::Validation(_)));
}

#[tokio::test]
async fn test_duplicate_doc_id_skipped_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;

    assert!(kb.add_document(paper_params("paper")).await.unwrap().is_some());
    assert!(kb.add_document(paper_params("paper")).await.unwrap().is_none());
    assert_eq!(
        kb.components().chunk_store.get_all_doc_ids().await.unwrap(),
        vec!["paper".to_string()]
    );
}

#[tokio::test]
async fn test_batch_ingest_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;

    let docs = vec![
        paper_params("good-1"),
        paper_params("bad/id"),
        paper_params("good-2"),
    ];
    let mut uploaded = kb
        .add_documents(docs, 2, std::time::Duration::from_millis(1))
        .await;
    uploaded.sort();
    assert_eq!(uploaded, vec!["good-1".to_string(), "good-2".to_string()]);
}

#[tokio::test]
async fn test_delete_document_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;
    kb.add_document(paper_params("paper")).await.unwrap();

    kb.delete_document("paper").await.unwrap();
    kb.delete_document("paper").await.unwrap();

    let segments = kb
        .query(&["AI".to_string()], loose_rse(5, 20), None, ReturnMode::Text)
        .await
        .unwrap();
    assert!(segments.is_empty());
}

#[tokio::test]
async fn test_metadata_round_trip_through_load() {
    let dir = tempfile::tempdir().unwrap();
    let metadata_store: Arc<LocalMetadataStore> = Arc::new(LocalMetadataStore::new(dir.path()));

    let components = Components::local_defaults("kb", dir.path()).unwrap();
    let records = components.to_records().unwrap();
    let config = KbConfig {
        title: "Research KB".to_string(),
        language: "de".to_string(),
        ..Default::default()
    };
    {
        let kb = KnowledgeBase::create("kb", config, components, Arc::clone(&metadata_store) as _)
            .await
            .unwrap();
        assert_eq!(kb.language(), "de");
    }

    let kb = KnowledgeBase::load("kb", metadata_store as _, Default::default())
        .await
        .unwrap();
    assert_eq!(kb.language(), "de");
    assert_eq!(kb.components().to_records().unwrap(), records);
}

#[tokio::test]
async fn test_create_refuses_existing_kb_without_exists_ok() {
    let dir = tempfile::tempdir().unwrap();
    let metadata_store = Arc::new(LocalMetadataStore::new(dir.path()));
    let components = Components::local_defaults("kb", dir.path()).unwrap();
    KnowledgeBase::create("kb", KbConfig::default(), components.clone(), Arc::clone(&metadata_store) as _)
        .await
        .unwrap();

    let err = KnowledgeBase::create(
        "kb",
        KbConfig { exists_ok: false, ..Default::default() },
        components,
        metadata_store as _,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StrataError::Validation(_)));
}

#[tokio::test]
async fn test_cancelled_ingest_leaves_no_partial_document() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = kb
        .add_document_with(paper_params("paper"), &cancel, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Cancelled));
    assert!(kb.components().chunk_store.get_all_doc_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_events_reach_done() {
    let dir = tempfile::tempdir().unwrap();
    let kb = make_kb(dir.path(), "kb", Arc::new(NoopReranker)).await;

    let (tx, mut rx) = tokio::sync::broadcast::channel(64);
    kb.add_document_with(paper_params("paper"), &CancellationToken::new(), Some(&tx))
        .await
        .unwrap();

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.doc_id, "paper");
        stages.push(event.stage);
    }
    assert_eq!(stages.first(), Some(&IngestStage::Sectioning));
    assert_eq!(stages.last(), Some(&IngestStage::Done));
}

/// Vector store whose writes always fail, for exercising the
/// compensating delete.
struct BrokenVectorStore;

#[async_trait::async_trait]
impl VectorStore for BrokenVectorStore {
    async fn upsert(&self, _records: Vec<VectorRecord>) -> Result<()> {
        Err(StrataError::Store("vector backend unavailable".to_string()))
    }

    async fn search(
        &self,
        _query: &[f32],
        _top_k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RankedResult>> {
        Ok(vec![])
    }

    async fn remove_document(&self, _doc_id: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        Ok(())
    }

    fn to_record(&self) -> ComponentRecord {
        ComponentRecord::new("BrokenVectorStore", serde_json::Value::Null)
    }
}

#[tokio::test]
async fn test_vector_failure_triggers_compensating_delete() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::with_sections(sample_paper_sections()));
    let mut components = components_with(dir.path(), "kb", llm, Arc::new(NoopReranker));
    components.vector_store = Arc::new(BrokenVectorStore);
    let metadata_store = Arc::new(LocalMetadataStore::new(dir.path()));
    let kb = KnowledgeBase::create("kb", KbConfig::default(), components, metadata_store)
        .await
        .unwrap();

    let err = kb.add_document(paper_params("paper")).await.unwrap_err();
    assert!(matches!(err, StrataError::Store(_)), "original error surfaced");
    // The chunk write was compensated away.
    assert!(kb.components().chunk_store.get_all_doc_ids().await.unwrap().is_empty());
}
