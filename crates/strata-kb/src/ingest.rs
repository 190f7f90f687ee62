//! The per-document ingest pipeline.
//!
//! Sectioning, chunking, AutoContext, one batched embedding call, then
//! chunk-store-first writes with a compensating delete: if the vector
//! write (or a cancellation) follows a successful chunk write, the chunk
//! entry is removed again so queries never see a half-ingested document.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use strata_common::config::DocumentParams;
use strata_common::{
    DocumentRecord, InputType, MetadataValue, Result, StrataError, VectorRecord,
};
use strata_ingestion::autocontext::{
    annotate_chunks, document_context, section_summaries, TermMapper,
};
use strata_ingestion::{chunk_sections, extract_sections};
use strata_store::CHUNK_TEXT_KEY;

use crate::components::Components;
use crate::progress::{IngestProgress, IngestStage};

/// Summary of one successful ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub doc_id: String,
    pub n_sections: usize,
    pub n_chunks: usize,
    pub duration_ms: u64,
}

#[instrument(skip_all, fields(kb_id, doc_id = %params.doc_id))]
pub(crate) async fn ingest_document(
    kb_id: &str,
    components: &Components,
    params: &DocumentParams,
    language: &str,
    cancel: &CancellationToken,
    progress: Option<&broadcast::Sender<IngestProgress>>,
) -> Result<IngestOutcome> {
    let ingest_id = Uuid::new_v4();
    let t0 = Instant::now();
    let doc_id = params.doc_id.as_str();

    let emit = |stage: IngestStage, message: &str, n_sections: usize, n_chunks: usize| {
        if let Some(tx) = progress {
            let mut event = IngestProgress::new(ingest_id, doc_id, stage, message);
            event.n_sections = n_sections;
            event.n_chunks = n_chunks;
            let _ = tx.send(event);
        }
    };

    let fail = |stage_error: &StrataError| {
        if let Some(tx) = progress {
            let mut event =
                IngestProgress::new(ingest_id, doc_id, IngestStage::Failed, "ingest failed");
            event.error = Some(stage_error.to_string());
            let _ = tx.send(event);
        }
    };

    let result = run_pipeline(kb_id, components, params, language, cancel, &emit).await;

    match &result {
        Ok(outcome) => {
            info!(
                n_sections = outcome.n_sections,
                n_chunks = outcome.n_chunks,
                duration_ms = t0.elapsed().as_millis() as u64,
                "document ingested"
            );
        }
        Err(e) => fail(e),
    }

    result.map(|mut outcome| {
        outcome.duration_ms = t0.elapsed().as_millis() as u64;
        outcome
    })
}

async fn run_pipeline(
    kb_id: &str,
    components: &Components,
    params: &DocumentParams,
    language: &str,
    cancel: &CancellationToken,
    emit: &dyn Fn(IngestStage, &str, usize, usize),
) -> Result<IngestOutcome> {
    let doc_id = params.doc_id.as_str();

    if cancel.is_cancelled() {
        return Err(StrataError::Cancelled);
    }

    // ── Sectioning ────────────────────────────────────────────────────────
    emit(IngestStage::Sectioning, "extracting sections", 0, 0);
    let sectioned = extract_sections(
        Arc::clone(&components.llm),
        &params.text,
        &params.sectioning,
        &params.chunking,
        language,
    )
    .await?;
    let n_sections = sectioned.sections.len();

    // ── Chunking ──────────────────────────────────────────────────────────
    emit(IngestStage::Chunking, "chunking sections", n_sections, 0);
    let mut chunks = chunk_sections(doc_id, &sectioned, &params.chunking);
    if chunks.is_empty() {
        return Err(StrataError::Validation(format!(
            "document `{doc_id}` produced no chunks"
        )));
    }
    let n_chunks = chunks.len();

    if cancel.is_cancelled() {
        return Err(StrataError::Cancelled);
    }

    // ── AutoContext ───────────────────────────────────────────────────────
    emit(IngestStage::Context, "building chunk context", n_sections, n_chunks);
    let document_text = sectioned.full_text();
    let context = document_context(
        components.llm.as_ref(),
        doc_id,
        &document_text,
        &params.document_title,
        &params.auto_context,
        language,
    )
    .await;
    let summaries = section_summaries(
        Arc::clone(&components.llm),
        &sectioned,
        &params.auto_context,
        language,
    )
    .await;
    let mapper = TermMapper::new(&params.auto_context.custom_term_mapping)?;
    annotate_chunks(&mut chunks, &context, &summaries, &mapper);

    if cancel.is_cancelled() {
        return Err(StrataError::Cancelled);
    }

    // ── Embedding ─────────────────────────────────────────────────────────
    emit(IngestStage::Embedding, "embedding chunks", n_sections, n_chunks);
    let texts: Vec<String> = chunks.iter().map(|c| c.embedding_text.clone()).collect();
    let vectors = components
        .embedding
        .embed(&texts, InputType::Document)
        .await
        .map_err(StrataError::Provider)?;
    if vectors.len() != chunks.len() {
        return Err(StrataError::Store(format!(
            "embedding returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    if cancel.is_cancelled() {
        return Err(StrataError::Cancelled);
    }

    // ── Storage: chunks first, then vectors ───────────────────────────────
    emit(IngestStage::Storing, "writing stores", n_sections, n_chunks);
    let record = DocumentRecord {
        doc_id: doc_id.to_string(),
        title: context.title.clone(),
        summary: context.summary.clone(),
        supp_id: params.supp_id.clone(),
        metadata: params.metadata.clone(),
        created_at: Utc::now(),
    };
    components.chunk_store.put_chunks(&record, &chunks).await?;

    let vector_records: Vec<VectorRecord> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            let mut metadata: BTreeMap<String, MetadataValue> = params.metadata.clone();
            metadata.insert(
                CHUNK_TEXT_KEY.to_string(),
                MetadataValue::Str(chunk.embedding_text.clone()),
            );
            VectorRecord {
                doc_id: doc_id.to_string(),
                chunk_index: chunk.chunk_index,
                vector,
                metadata,
            }
        })
        .collect();

    // A cancellation from here on behaves like a vector-store failure:
    // take the chunk write back so neither store keeps the document.
    if cancel.is_cancelled() {
        compensate(components, kb_id, doc_id).await;
        return Err(StrataError::Cancelled);
    }
    if let Err(e) = components.vector_store.upsert(vector_records).await {
        warn!(error = %e, "vector write failed, removing chunk entry");
        compensate(components, kb_id, doc_id).await;
        return Err(e);
    }

    emit(IngestStage::Done, "ingest complete", n_sections, n_chunks);
    Ok(IngestOutcome {
        doc_id: doc_id.to_string(),
        n_sections,
        n_chunks,
        duration_ms: 0,
    })
}

/// Compensating delete after a partial write. Best effort: failures are
/// logged, the original error is what the caller sees.
async fn compensate(components: &Components, kb_id: &str, doc_id: &str) {
    if let Err(e) = components.chunk_store.remove_document(doc_id).await {
        warn!(kb_id, doc_id, error = %e, "compensating chunk delete failed, residue remains");
    }
    if let Err(e) = components.vector_store.remove_document(doc_id).await {
        warn!(kb_id, doc_id, error = %e, "compensating vector delete failed, residue remains");
    }
}
