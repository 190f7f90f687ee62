//! Core data model shared across the workspace.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::MetadataValue;

/// A non-empty line of the source document.
///
/// Lines are the only addressable unit the sectioning model sees. Numbers
/// are dense and 0-based; empty and whitespace-only lines are discarded
/// before numbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub line_no: u32,
    pub content: String,
}

/// A contiguous run of lines submitted to the LLM in one sectioning call.
#[derive(Debug, Clone)]
pub struct Window {
    pub start_line: u32,
    /// Inclusive.
    pub end_line: u32,
    pub text: String,
}

/// A semantic section of a document: a titled, contiguous line range.
///
/// Across a document the section list is sorted by `start_line`, starts
/// at line 0, ends at the last line, and has no gaps or overlaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub start_line: u32,
    /// Inclusive.
    pub end_line: u32,
}

/// A retrieval unit cut from one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub doc_id: String,
    /// Dense per-document index starting at 0.
    pub chunk_index: u32,
    pub section_index: u32,
    pub section_title: String,
    /// Raw text used for display and segment assembly.
    pub content: String,
    /// Text actually embedded; may carry a contextual header and custom
    /// term substitutions on top of `content`.
    pub embedding_text: String,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub is_visual: bool,
}

/// Per-document record kept by the chunk store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub title: String,
    pub summary: String,
    pub supp_id: String,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub created_at: DateTime<Utc>,
}

/// One embedded chunk in the vector store. Vectors are L2-normalized so
/// inner product equals cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub doc_id: String,
    pub chunk_index: u32,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// A search hit, after reranking. `similarity` is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub doc_id: String,
    pub chunk_index: u32,
    pub similarity: f32,
    /// Embedding text of the hit, carried from the vector store so
    /// rerankers can score it. Not part of the query output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Whether a text is embedded as stored content or as a search query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Document,
    Query,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Document => "document",
            InputType::Query => "query",
        }
    }
}

/// How query results are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    #[default]
    Text,
    PageImages,
    /// Page images when the segment contains visual chunks, text otherwise.
    Dynamic,
}

/// Materialized segment content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentContent {
    Text(String),
    PageImages(Vec<PathBuf>),
}

impl SegmentContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SegmentContent::Text(t) => Some(t),
            SegmentContent::PageImages(_) => None,
        }
    }
}

/// A contiguous chunk range returned to the caller as one result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub doc_id: String,
    pub chunk_start: u32,
    /// Exclusive.
    pub chunk_end: u32,
    pub content: SegmentContent,
    pub segment_page_start: Option<u32>,
    pub segment_page_end: Option<u32>,
    pub score: f32,
}
