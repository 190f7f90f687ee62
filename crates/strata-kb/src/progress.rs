//! Ingest progress events.
//!
//! Cloneable events emitted over an optional broadcast channel so callers
//! (web UIs, batch drivers) can follow an ingest without polling. Send
//! failures mean nobody is listening and are ignored.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Sectioning,
    Chunking,
    Context,
    Embedding,
    Storing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestProgress {
    pub ingest_id: Uuid,
    pub doc_id: String,
    pub stage: IngestStage,
    pub message: String,
    pub n_sections: usize,
    pub n_chunks: usize,
    pub error: Option<String>,
}

impl IngestProgress {
    pub(crate) fn new(ingest_id: Uuid, doc_id: &str, stage: IngestStage, message: &str) -> Self {
        Self {
            ingest_id,
            doc_id: doc_id.to_string(),
            stage,
            message: message.to_string(),
            n_sections: 0,
            n_chunks: 0,
            error: None,
        }
    }
}
