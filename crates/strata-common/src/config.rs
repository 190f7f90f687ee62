//! Per-document ingest configuration.
//!
//! All structs deserialize with per-field defaults so callers can supply
//! sparse configuration maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::MetadataValue;

/// Semantic sectioning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectioningConfig {
    #[serde(default = "default_true")]
    pub use_semantic_sectioning: bool,
    /// Character budget per LLM window. Should be at least twice the
    /// expected section length so every non-final window holds two
    /// sections.
    #[serde(default = "default_max_chars_per_window")]
    pub max_chars_per_window: usize,
    /// Collapse threshold: when the average section is shorter than this,
    /// the decomposition is replaced by a single consolidated section.
    #[serde(default = "default_min_avg_chars_per_section")]
    pub min_avg_chars_per_section: usize,
    /// Attempts per window, counting the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_llm_concurrency")]
    pub llm_max_concurrent_requests: usize,
}

fn default_true() -> bool { true }
fn default_max_chars_per_window() -> usize { 20_000 }
fn default_min_avg_chars_per_section() -> usize { 500 }
fn default_max_attempts() -> u32 { 2 }
fn default_llm_concurrency() -> usize { 5 }

impl Default for SectioningConfig {
    fn default() -> Self {
        Self {
            use_semantic_sectioning: true,
            max_chars_per_window: default_max_chars_per_window(),
            min_avg_chars_per_section: default_min_avg_chars_per_section(),
            max_attempts: default_max_attempts(),
            llm_max_concurrent_requests: default_llm_concurrency(),
        }
    }
}

/// Chunking knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Sections (and whole documents) shorter than this become a single
    /// chunk.
    #[serde(default = "default_min_length_for_chunking")]
    pub min_length_for_chunking: usize,
}

fn default_chunk_size() -> usize { 800 }
fn default_min_length_for_chunking() -> usize { 2000 }

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_length_for_chunking: default_min_length_for_chunking(),
        }
    }
}

/// AutoContext knobs: what contextual header each chunk is embedded with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoContextConfig {
    /// Generate a document title with the LLM when the caller supplies none.
    #[serde(default = "default_true")]
    pub use_generated_title: bool,
    #[serde(default)]
    pub document_title_guidance: String,
    #[serde(default = "default_true")]
    pub get_document_summary: bool,
    #[serde(default)]
    pub document_summarization_guidance: String,
    #[serde(default)]
    pub get_section_summaries: bool,
    #[serde(default)]
    pub section_summarization_guidance: String,
    #[serde(default = "default_llm_concurrency")]
    pub llm_max_concurrent_requests: usize,
    /// canonical term -> aliases replaced by it in embedding text.
    #[serde(default)]
    pub custom_term_mapping: BTreeMap<String, Vec<String>>,
}

impl Default for AutoContextConfig {
    fn default() -> Self {
        Self {
            use_generated_title: true,
            document_title_guidance: String::new(),
            get_document_summary: true,
            document_summarization_guidance: String::new(),
            get_section_summaries: false,
            section_summarization_guidance: String::new(),
            llm_max_concurrent_requests: default_llm_concurrency(),
            custom_term_mapping: BTreeMap::new(),
        }
    }
}

/// Everything needed to ingest one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentParams {
    pub doc_id: String,
    pub text: String,
    /// Caller-supplied title; when empty one may be generated, falling
    /// back to the doc_id.
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub auto_context: AutoContextConfig,
    #[serde(default)]
    pub sectioning: SectioningConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub supp_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl DocumentParams {
    pub fn from_text(doc_id: &str, text: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }
}
