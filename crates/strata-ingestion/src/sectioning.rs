//! Semantic sectioning.
//!
//! Splits a document into titled, contiguous line ranges using one
//! structured LLM call per window. Windows are fixed up front and
//! dispatched concurrently; boundaries are reconciled afterwards by
//! discarding each non-final window's terminal section, which may have
//! been truncated by the window edge. A consolidation safeguard collapses
//! implausibly dense decompositions (one title per line) into a single
//! section.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use strata_common::config::{ChunkingConfig, SectioningConfig};
use strata_common::{Line, ProviderError, Result, Section, StrataError, Window};
use strata_providers::LlmProvider;

use crate::lines::{index_lines, join_lines};
use crate::windows::build_windows;

/// Title of the single section produced when sectioning is disabled or
/// the document is too short to bother.
pub const WHOLE_DOCUMENT_TITLE: &str = "Full Document";

/// Title of the safeguard section that replaces an implausibly dense
/// decomposition.
pub const CONSOLIDATED_TITLE: &str = "Consolidated Section";

/// Output of sectioning: the section list with materialized contents,
/// plus the indexed lines for downstream use.
#[derive(Debug, Clone)]
pub struct SectionedDocument {
    pub sections: Vec<Section>,
    /// Parallel to `sections`.
    pub contents: Vec<String>,
    pub lines: Vec<Line>,
    /// Byte offset of each line in the original text.
    pub line_offsets: Vec<usize>,
}

impl SectionedDocument {
    /// The document text as seen by AutoContext: section contents in order.
    pub fn full_text(&self) -> String {
        self.contents.join("\n")
    }
}

/// Decompose `text` into sections.
///
/// Sectioning is skipped (one whole-document section) when disabled or
/// when the text is below the chunking threshold; the LLM never sees
/// short documents.
#[instrument(skip_all, fields(chars = text.len()))]
pub async fn extract_sections(
    llm: Arc<dyn LlmProvider>,
    text: &str,
    cfg: &SectioningConfig,
    chunking: &ChunkingConfig,
    language: &str,
) -> Result<SectionedDocument> {
    let (lines, line_offsets) = index_lines(text);
    if lines.is_empty() {
        return Err(StrataError::Validation("document has no content".to_string()));
    }
    let max_line = lines[lines.len() - 1].line_no;

    if !cfg.use_semantic_sectioning || text.len() < chunking.min_length_for_chunking {
        return Ok(SectionedDocument {
            sections: vec![Section {
                title: WHOLE_DOCUMENT_TITLE.to_string(),
                start_line: 0,
                end_line: max_line,
            }],
            contents: vec![text.to_string()],
            lines,
            line_offsets,
        });
    }

    let windows = build_windows(&lines, cfg.max_chars_per_window);
    debug!(n_windows = windows.len(), "dispatching sectioning windows");

    let mut indexed: Vec<(usize, Result<Vec<(String, u32)>>)> =
        stream::iter(windows.iter().enumerate())
            .map(|(k, window)| {
                let llm = Arc::clone(&llm);
                let lines = &lines;
                async move {
                    (k, process_window(llm.as_ref(), window, lines, cfg, language).await)
                }
            })
            .buffer_unordered(cfg.llm_max_concurrent_requests.max(1))
            .collect()
            .await;
    indexed.sort_by_key(|(k, _)| *k);

    let mut per_window = Vec::with_capacity(indexed.len());
    for (_, result) in indexed {
        per_window.push(result?);
    }

    let merged = merge_windows(&per_window, &windows);
    let mut sections = normalize_sections(merged, max_line);
    sections = consolidate_if_sparse(sections, text.len(), cfg.min_avg_chars_per_section, max_line);

    let contents = sections
        .iter()
        .map(|s| join_lines(&lines, s.start_line, s.end_line))
        .collect();

    Ok(SectionedDocument { sections, contents, lines, line_offsets })
}

// ── Per-window LLM call ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawSectionList {
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    title: String,
    start_index: i64,
}

fn sections_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "start_index": {"type": "integer"}
                    },
                    "required": ["title", "start_index"]
                }
            }
        },
        "required": ["sections"]
    })
}

fn window_prompt(window: &Window, lines: &[Line], language: &str) -> String {
    let mut numbered = String::new();
    for line in lines
        .iter()
        .filter(|l| l.line_no >= window.start_line && l.line_no <= window.end_line)
    {
        numbered.push_str(&format!("{}: {}\n", line.line_no, line.content));
    }
    format!(
        "Identify the major sections of the document excerpt below. The lines are \
         numbered; a section is a contiguous run of lines about one topic. For each \
         section, give a short descriptive title and the number of its first line. \
         Sections must be in order and together cover the excerpt, so the first \
         section starts at line {start}. Write titles in {language}.\n\n\
         <document>\n{numbered}</document>",
        start = window.start_line,
    )
}

/// Call the LLM for one window, retrying schema failures with the invalid
/// reply attached as negative context. Exhausting the attempt budget (or a
/// permanent provider error) aborts the document.
async fn process_window(
    llm: &dyn LlmProvider,
    window: &Window,
    lines: &[Line],
    cfg: &SectioningConfig,
    language: &str,
) -> Result<Vec<(String, u32)>> {
    let base_prompt = window_prompt(window, lines, language);
    let schema = sections_schema();
    let mut rejected: Option<(String, String)> = None;

    for attempt in 1..=cfg.max_attempts.max(1) {
        let prompt = match &rejected {
            None => base_prompt.clone(),
            Some((reply, problem)) => format!(
                "{base_prompt}\n\nYour previous reply was rejected ({problem}):\n\
                 {reply}\nReturn a corrected JSON object."
            ),
        };

        match llm.complete(&prompt, &schema).await {
            Ok(reply) => match validate_reply(&reply, window) {
                Ok(sections) => return Ok(sections),
                Err(problem) => {
                    warn!(
                        start = window.start_line,
                        end = window.end_line,
                        attempt,
                        problem = %problem,
                        "sectioning reply rejected"
                    );
                    rejected = Some((reply.to_string(), problem));
                }
            },
            Err(ProviderError::Schema(problem)) => {
                warn!(start = window.start_line, attempt, problem = %problem, "non-JSON sectioning reply");
                rejected = Some(("<unparseable>".to_string(), problem));
            }
            Err(e @ ProviderError::Transient(_)) => {
                // The provider already ran its backoff; count the attempt.
                warn!(start = window.start_line, attempt, error = %e, "sectioning call failed");
            }
            Err(e @ ProviderError::Permanent(_)) => {
                return Err(StrataError::SectioningFailed(format!(
                    "window {}..{}: {e}",
                    window.start_line, window.end_line
                )));
            }
        }
    }

    Err(StrataError::SectioningFailed(format!(
        "window {}..{} exhausted {} attempts",
        window.start_line,
        window.end_line,
        cfg.max_attempts.max(1)
    )))
}

/// Check a reply against the window: non-empty trimmed titles, start
/// indices inside the window, strictly increasing.
fn validate_reply(reply: &Value, window: &Window) -> std::result::Result<Vec<(String, u32)>, String> {
    let parsed: RawSectionList = serde_json::from_value(reply.clone())
        .map_err(|e| format!("reply does not match the schema: {e}"))?;
    if parsed.sections.is_empty() {
        return Err("empty section list".to_string());
    }

    let mut sections = Vec::with_capacity(parsed.sections.len());
    let mut previous: Option<u32> = None;
    for raw in parsed.sections {
        let title = raw.title.trim().to_string();
        if title.is_empty() {
            return Err("section with an empty title".to_string());
        }
        if raw.start_index < window.start_line as i64 || raw.start_index > window.end_line as i64 {
            return Err(format!(
                "start_index {} outside window {}..{}",
                raw.start_index, window.start_line, window.end_line
            ));
        }
        let start = raw.start_index as u32;
        if previous.is_some_and(|p| start <= p) {
            return Err(format!("start_index {start} is not increasing"));
        }
        previous = Some(start);
        sections.push((title, start));
    }
    Ok(sections)
}

// ── Merging and invariants ────────────────────────────────────────────────────

/// Concatenate per-window section lists, discarding each non-final
/// window's terminal section (possibly truncated by the window edge) and
/// dropping the seam duplicate when a window re-reports the section it
/// opens inside.
fn merge_windows(per_window: &[Vec<(String, u32)>], windows: &[Window]) -> Vec<(String, u32)> {
    let mut merged: Vec<(String, u32)> = Vec::new();
    let n = windows.len();

    for (k, sections) in per_window.iter().enumerate() {
        let is_final = k + 1 == n;
        let keep = if !is_final && sections.len() > 1 {
            &sections[..sections.len() - 1]
        } else {
            &sections[..]
        };
        for (i, (title, start)) in keep.iter().enumerate() {
            if i == 0 {
                if let Some((last_title, _)) = merged.last() {
                    if *start == windows[k].start_line && title == last_title {
                        continue;
                    }
                }
            }
            merged.push((title.clone(), *start));
        }
    }

    merged
}

/// Enforce the section-list invariants: sorted starts, first section at
/// line 0, contiguous coverage through `max_line`.
fn normalize_sections(mut starts: Vec<(String, u32)>, max_line: u32) -> Vec<Section> {
    starts.sort_by_key(|(_, s)| *s);
    starts.dedup_by_key(|(_, s)| *s);
    if starts.is_empty() {
        starts.push((WHOLE_DOCUMENT_TITLE.to_string(), 0));
    }
    starts[0].1 = 0;

    let mut sections = Vec::with_capacity(starts.len());
    for i in 0..starts.len() {
        let end_line = if i + 1 < starts.len() { starts[i + 1].1 - 1 } else { max_line };
        sections.push(Section {
            title: starts[i].0.clone(),
            start_line: starts[i].1,
            end_line,
        });
    }
    sections
}

/// Collapse the decomposition to a single consolidated section when the
/// average section is implausibly short, which happens when the model
/// titles every line.
fn consolidate_if_sparse(
    sections: Vec<Section>,
    total_chars: usize,
    min_avg_chars_per_section: usize,
    max_line: u32,
) -> Vec<Section> {
    if sections.len() > 1 && total_chars / sections.len() < min_avg_chars_per_section {
        warn!(
            n_sections = sections.len(),
            total_chars, "sparse sectioning collapsed into a single section"
        );
        return vec![Section {
            title: CONSOLIDATED_TITLE.to_string(),
            start_line: 0,
            end_line: max_line,
        }];
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: u32, end: u32) -> Window {
        Window { start_line: start, end_line: end, text: String::new() }
    }

    #[test]
    fn test_validate_rejects_out_of_window_index() {
        let reply = json!({"sections": [{"title": "Intro", "start_index": 40}]});
        assert!(validate_reply(&reply, &window(0, 30)).is_err());
    }

    #[test]
    fn test_validate_rejects_non_monotonic_starts() {
        let reply = json!({"sections": [
            {"title": "A", "start_index": 5},
            {"title": "B", "start_index": 5},
        ]});
        assert!(validate_reply(&reply, &window(0, 30)).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_reply() {
        let reply = json!({"sections": [
            {"title": "A", "start_index": 0},
            {"title": "B", "start_index": 9},
        ]});
        let sections = validate_reply(&reply, &window(0, 30)).unwrap();
        assert_eq!(sections, vec![("A".to_string(), 0), ("B".to_string(), 9)]);
    }

    #[test]
    fn test_merge_discards_terminal_section_of_non_final_windows() {
        let windows = vec![window(0, 9), window(10, 19)];
        let per_window = vec![
            vec![("A".to_string(), 0), ("B".to_string(), 6)],
            vec![("C".to_string(), 10), ("D".to_string(), 15)],
        ];
        let merged = merge_windows(&per_window, &windows);
        // "B" is window 0's terminal section and is dropped; the final
        // window keeps everything.
        assert_eq!(
            merged,
            vec![
                ("A".to_string(), 0),
                ("C".to_string(), 10),
                ("D".to_string(), 15),
            ]
        );
    }

    #[test]
    fn test_merge_drops_seam_duplicate() {
        let windows = vec![window(0, 9), window(10, 19)];
        let per_window = vec![
            vec![("A".to_string(), 0), ("B".to_string(), 8)],
            vec![("A".to_string(), 10), ("C".to_string(), 14)],
        ];
        let merged = merge_windows(&per_window, &windows);
        assert_eq!(merged, vec![("A".to_string(), 0), ("C".to_string(), 14)]);
    }

    #[test]
    fn test_merge_keeps_single_section_window() {
        // A non-final window that reported only one section cannot have it
        // discarded, or the range would go uncovered.
        let windows = vec![window(0, 9), window(10, 19)];
        let per_window = vec![
            vec![("A".to_string(), 0)],
            vec![("B".to_string(), 10)],
        ];
        let merged = merge_windows(&per_window, &windows);
        assert_eq!(merged, vec![("A".to_string(), 0), ("B".to_string(), 10)]);
    }

    #[test]
    fn test_normalize_covers_full_range_without_gaps() {
        let sections = normalize_sections(
            vec![("B".to_string(), 12), ("A".to_string(), 3)],
            20,
        );
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].start_line, 0);
        assert_eq!(sections[0].end_line, 11);
        assert_eq!(sections[1].start_line, 12);
        assert_eq!(sections[1].end_line, 20);
        assert_eq!(sections[0].title, "A");
    }

    #[test]
    fn test_consolidation_safeguard() {
        let dense: Vec<(String, u32)> =
            (0..50).map(|i| (format!("Tiny {i}"), i * 2)).collect();
        let sections = normalize_sections(dense, 99);
        let collapsed = consolidate_if_sparse(sections, 3000, 500, 99);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].title, CONSOLIDATED_TITLE);
        assert_eq!(collapsed[0].start_line, 0);
        assert_eq!(collapsed[0].end_line, 99);
    }

    #[test]
    fn test_no_consolidation_when_sections_substantial() {
        let sections = normalize_sections(
            vec![("A".to_string(), 0), ("B".to_string(), 50)],
            99,
        );
        let kept = consolidate_if_sparse(sections.clone(), 3000, 500, 99);
        assert_eq!(kept, sections);
    }
}
