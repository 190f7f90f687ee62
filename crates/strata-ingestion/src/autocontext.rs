//! AutoContext annotation.
//!
//! Prefixes each chunk's embedding text with a contextual header built
//! from the document title, document summary, and (optionally) a per-
//! section summary, then applies the custom term mapping. Displayed chunk
//! content is never touched.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use regex::RegexBuilder;
use serde_json::json;
use tracing::{debug, instrument, warn};

use strata_common::config::AutoContextConfig;
use strata_common::{Chunk, Result};
use strata_providers::LlmProvider;

use crate::sectioning::SectionedDocument;

/// How much of the document the title and summary prompts see.
const CONTEXT_SAMPLE_CHARS: usize = 5000;

/// Document-level context attached to every chunk.
#[derive(Debug, Clone, Default)]
pub struct DocumentContext {
    pub title: String,
    pub summary: String,
}

/// Generate the document title and summary.
///
/// The title is the caller's when supplied; otherwise one LLM call over
/// the head of the document, falling back to `doc_id` on failure. The
/// summary is one optional call; failures degrade to an empty summary
/// with a warning rather than aborting the ingest.
#[instrument(skip_all, fields(doc_id))]
pub async fn document_context(
    llm: &dyn LlmProvider,
    doc_id: &str,
    text: &str,
    supplied_title: &str,
    cfg: &AutoContextConfig,
    language: &str,
) -> DocumentContext {
    let sample: &str = &text[..floor_char_boundary(text, CONTEXT_SAMPLE_CHARS)];

    let title = if !supplied_title.is_empty() {
        supplied_title.to_string()
    } else if cfg.use_generated_title {
        let guidance = &cfg.document_title_guidance;
        let prompt = format!(
            "Give a concise title for the document beginning below. {guidance}\n\
             Write the title in {language}.\n\n<document>\n{sample}\n</document>"
        );
        let schema = json!({
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"]
        });
        match llm.complete(&prompt, &schema).await {
            Ok(reply) => reply["title"]
                .as_str()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| doc_id.to_string()),
            Err(e) => {
                warn!(error = %e, "title generation failed, using doc_id");
                doc_id.to_string()
            }
        }
    } else {
        doc_id.to_string()
    };

    let summary = if cfg.get_document_summary {
        let guidance = &cfg.document_summarization_guidance;
        let prompt = format!(
            "Summarize the document titled \"{title}\" in two or three sentences. \
             {guidance}\nWrite the summary in {language}.\n\n<document>\n{sample}\n</document>"
        );
        let schema = json!({
            "type": "object",
            "properties": {"summary": {"type": "string"}},
            "required": ["summary"]
        });
        match llm.complete(&prompt, &schema).await {
            Ok(reply) => reply["summary"].as_str().unwrap_or("").trim().to_string(),
            Err(e) => {
                warn!(error = %e, "document summary failed, continuing without one");
                String::new()
            }
        }
    } else {
        String::new()
    };

    DocumentContext { title, summary }
}

/// Summarize each section through a bounded-concurrency pool. Entries are
/// `None` when summarization is disabled or a call fails.
pub async fn section_summaries(
    llm: Arc<dyn LlmProvider>,
    sectioned: &SectionedDocument,
    cfg: &AutoContextConfig,
    language: &str,
) -> Vec<Option<String>> {
    if !cfg.get_section_summaries {
        return vec![None; sectioned.sections.len()];
    }

    let guidance = cfg.section_summarization_guidance.clone();
    let mut indexed: Vec<(usize, Option<String>)> = stream::iter(
        sectioned
            .sections
            .iter()
            .zip(sectioned.contents.iter())
            .enumerate(),
    )
    .map(|(i, (section, content))| {
        let llm = Arc::clone(&llm);
        let guidance = guidance.clone();
        let title = section.title.clone();
        let sample = content[..floor_char_boundary(content, CONTEXT_SAMPLE_CHARS)].to_string();
        let language = language.to_string();
        async move {
            let prompt = format!(
                "Summarize the section \"{title}\" below in one sentence. {guidance}\n\
                 Write the summary in {language}.\n\n<section>\n{sample}\n</section>"
            );
            let schema = json!({
                "type": "object",
                "properties": {"summary": {"type": "string"}},
                "required": ["summary"]
            });
            let summary = match llm.complete(&prompt, &schema).await {
                Ok(reply) => reply["summary"].as_str().map(|s| s.trim().to_string()),
                Err(e) => {
                    warn!(section = %title, error = %e, "section summary failed");
                    None
                }
            };
            (i, summary.filter(|s| !s.is_empty()))
        }
    })
    .buffer_unordered(cfg.llm_max_concurrent_requests.max(1))
    .collect()
    .await;

    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, s)| s).collect()
}

/// Build the contextual header for a chunk: document title, document
/// summary, section title, section summary, joined by blank lines with
/// empty parts elided.
pub fn chunk_header(
    document_title: &str,
    document_summary: &str,
    section_title: &str,
    section_summary: &str,
) -> String {
    [document_title, document_summary, section_title, section_summary]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Compiled custom term mapping: canonical term -> aliases, replaced by
/// literal, case-insensitive, word-boundary substitution.
pub struct TermMapper {
    rules: Vec<(regex::Regex, String)>,
}

impl TermMapper {
    pub fn new(mapping: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut rules = Vec::new();
        for (canonical, aliases) in mapping {
            for alias in aliases {
                let pattern = format!(r"\b{}\b", regex::escape(alias));
                let re = RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        strata_common::StrataError::Validation(format!(
                            "bad term mapping alias `{alias}`: {e}"
                        ))
                    })?;
                rules.push((re, canonical.clone()));
            }
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (re, canonical) in &self.rules {
            out = re.replace_all(&out, canonical.as_str()).into_owned();
        }
        out
    }
}

/// Fill in each chunk's `embedding_text` from its header and content.
pub fn annotate_chunks(
    chunks: &mut [Chunk],
    context: &DocumentContext,
    section_summaries: &[Option<String>],
    mapper: &TermMapper,
) {
    for chunk in chunks.iter_mut() {
        let section_summary = section_summaries
            .get(chunk.section_index as usize)
            .and_then(|s| s.as_deref())
            .unwrap_or("");
        let header = chunk_header(
            &context.title,
            &context.summary,
            &chunk.section_title,
            section_summary,
        );
        let embedding_text = if header.is_empty() {
            chunk.content.clone()
        } else {
            format!("{header}\n\n{}", chunk.content)
        };
        chunk.embedding_text = if mapper.is_empty() {
            embedding_text
        } else {
            mapper.apply(&embedding_text)
        };
    }
    debug!(n_chunks = chunks.len(), "chunks annotated");
}

/// Largest byte index `<= max` that sits on a char boundary.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut index = max;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_elides_empty_parts() {
        assert_eq!(
            chunk_header("Title", "", "Methods", ""),
            "Title\n\nMethods"
        );
        assert_eq!(chunk_header("", "", "", ""), "");
        assert_eq!(
            chunk_header("T", "S", "Sec", "Sum"),
            "T\n\nS\n\nSec\n\nSum"
        );
    }

    #[test]
    fn test_term_mapping_is_case_insensitive_and_word_bounded() {
        let mut mapping = BTreeMap::new();
        mapping.insert("AI".to_string(), vec!["artificial intelligence".to_string()]);
        let mapper = TermMapper::new(&mapping).unwrap();

        assert_eq!(
            mapper.apply("Artificial Intelligence is here"),
            "AI is here"
        );
        // No substitution inside larger words.
        mapping.insert("ML".to_string(), vec!["ml".to_string()]);
        let mapper = TermMapper::new(&mapping).unwrap();
        assert_eq!(mapper.apply("html and ml"), "html and ML");
    }

    #[test]
    fn test_annotate_only_touches_embedding_text() {
        let mut chunks = vec![Chunk {
            doc_id: "d".to_string(),
            chunk_index: 0,
            section_index: 0,
            section_title: "Intro".to_string(),
            content: "machine learning results".to_string(),
            embedding_text: String::new(),
            page_start: None,
            page_end: None,
            is_visual: false,
        }];
        let context = DocumentContext {
            title: "Paper".to_string(),
            summary: "About ML.".to_string(),
        };
        let mut mapping = BTreeMap::new();
        mapping.insert("ML".to_string(), vec!["machine learning".to_string()]);
        let mapper = TermMapper::new(&mapping).unwrap();

        annotate_chunks(&mut chunks, &context, &[None], &mapper);

        assert_eq!(
            chunks[0].embedding_text,
            "Paper\n\nAbout ML.\n\nIntro\n\nML results"
        );
        assert_eq!(chunks[0].content, "machine learning results");
    }

    #[test]
    fn test_floor_char_boundary_multibyte() {
        let text = "héllo";
        // Index 2 falls inside the two-byte 'é'.
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(floor_char_boundary(text, 100), text.len());
    }
}
