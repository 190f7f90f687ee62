//! Integration tests for semantic sectioning and chunking against
//! scripted LLM replies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use strata_common::config::{ChunkingConfig, SectioningConfig};
use strata_common::StrataError;
use strata_ingestion::sectioning::{CONSOLIDATED_TITLE, WHOLE_DOCUMENT_TITLE};
use strata_ingestion::{chunk_sections, extract_sections};
use strata_test_utils::{
    sample_paper_sections, sections_reply, FailingLlm, ScriptedLlm, SAMPLE_PAPER,
};

fn sectioning_cfg() -> SectioningConfig {
    SectioningConfig::default()
}

fn chunking_cfg() -> ChunkingConfig {
    ChunkingConfig { chunk_size: 800, min_length_for_chunking: 1000 }
}

fn assert_contiguous_coverage(sections: &[strata_common::Section], max_line: u32) {
    assert_eq!(sections[0].start_line, 0);
    for pair in sections.windows(2) {
        assert_eq!(pair[0].end_line + 1, pair[1].start_line);
    }
    assert_eq!(sections.last().unwrap().end_line, max_line);
}

#[tokio::test]
async fn test_four_section_paper() {
    let llm = Arc::new(ScriptedLlm::with_sections(sample_paper_sections()));
    let sectioned = extract_sections(llm, SAMPLE_PAPER, &sectioning_cfg(), &chunking_cfg(), "en")
        .await
        .unwrap();

    assert_eq!(sectioned.sections.len(), 4);
    assert_contiguous_coverage(&sectioned.sections, 26);
    for (section, content) in sectioned.sections.iter().zip(sectioned.contents.iter()) {
        // Each title is the first line of its paragraph.
        assert!(content.starts_with(&section.title), "{}", section.title);
    }
    assert_eq!(sectioned.sections[3].end_line, 26);
}

#[tokio::test]
async fn test_multi_window_sectioning_preserves_invariants() {
    // Three copies of the paper, windows small enough to force several
    // LLM calls; the scripted model reports two sections per window.
    let document = [SAMPLE_PAPER, SAMPLE_PAPER, SAMPLE_PAPER].join("\n");
    let llm = Arc::new(ScriptedLlm::new(|prompt| {
        let start = ScriptedLlm::window_start(prompt).unwrap();
        sections_reply(&[
            (format!("Part {start}"), start),
            (format!("Part {start} continued"), start + 3),
        ])
    }));

    let cfg = SectioningConfig {
        max_chars_per_window: 3000,
        // The scripted sections are tiny on purpose; keep the safeguard out
        // of the way so the merge itself is what gets tested.
        min_avg_chars_per_section: 1,
        ..sectioning_cfg()
    };
    let sectioned = extract_sections(Arc::clone(&llm) as _, &document, &cfg, &chunking_cfg(), "en")
        .await
        .unwrap();

    let max_line = sectioned.lines.last().unwrap().line_no;
    assert_contiguous_coverage(&sectioned.sections, max_line);
    assert!(llm.call_count() > 1, "expected several window calls");
}

#[tokio::test]
async fn test_pathological_reply_collapses_to_consolidated_section() {
    let document = (0..100)
        .map(|i| format!("This is line number {i}"))
        .collect::<Vec<_>>()
        .join("\n");
    // One title per other line: implausibly dense.
    let dense: Vec<(String, u32)> = (0..50).map(|i| (format!("Tiny Section {i}"), i * 2)).collect();
    let llm = Arc::new(ScriptedLlm::with_sections(dense));

    let cfg = SectioningConfig { min_avg_chars_per_section: 500, ..sectioning_cfg() };
    let chunking = ChunkingConfig { chunk_size: 800, min_length_for_chunking: 50 };
    let sectioned = extract_sections(llm, &document, &cfg, &chunking, "en").await.unwrap();

    assert_eq!(sectioned.sections.len(), 1);
    assert_eq!(sectioned.sections[0].title, CONSOLIDATED_TITLE);
    assert_eq!(sectioned.sections[0].start_line, 0);
    assert_eq!(sectioned.sections[0].end_line, 99);

    // Chunks are still produced, all from the consolidated section.
    let chunks = chunk_sections("doc", &sectioned, &chunking);
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.section_index == 0));
}

#[tokio::test]
async fn test_disabled_sectioning_returns_whole_document() {
    let llm = Arc::new(ScriptedLlm::with_sections(sample_paper_sections()));
    let cfg = SectioningConfig { use_semantic_sectioning: false, ..sectioning_cfg() };
    let sectioned = extract_sections(Arc::clone(&llm) as _, SAMPLE_PAPER, &cfg, &chunking_cfg(), "en")
        .await
        .unwrap();

    assert_eq!(sectioned.sections.len(), 1);
    assert_eq!(sectioned.sections[0].start_line, 0);
    assert_eq!(sectioned.sections[0].end_line, 26);
    assert_eq!(sectioned.contents[0], SAMPLE_PAPER);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_short_document_identity() {
    let text = "This is a short document.";
    let llm = Arc::new(ScriptedLlm::with_sections(vec![]));
    let sectioned = extract_sections(Arc::clone(&llm) as _, text, &sectioning_cfg(), &chunking_cfg(), "en")
        .await
        .unwrap();

    assert_eq!(sectioned.sections.len(), 1);
    assert_eq!(sectioned.sections[0].title, WHOLE_DOCUMENT_TITLE);
    assert_eq!(sectioned.contents[0], text);
    assert_eq!(llm.call_count(), 0, "short documents never reach the LLM");

    let chunks = chunk_sections("doc", &sectioned, &chunking_cfg());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, text);
}

#[tokio::test]
async fn test_invalid_reply_retried_with_negative_context() {
    let prompts: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let sections = sample_paper_sections();

    let llm = {
        let prompts = Arc::clone(&prompts);
        let attempts = Arc::clone(&attempts);
        Arc::new(ScriptedLlm::new(move |prompt| {
            prompts.lock().unwrap().push(prompt.to_string());
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                json!({"sections": []})
            } else {
                sections_reply(&sections)
            }
        }))
    };

    let sectioned = extract_sections(llm, SAMPLE_PAPER, &sectioning_cfg(), &chunking_cfg(), "en")
        .await
        .unwrap();
    assert_eq!(sectioned.sections.len(), 4);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("rejected"), "retry prompt carries negative context");
}

#[tokio::test]
async fn test_permanent_failure_aborts_document() {
    let llm = Arc::new(FailingLlm { transient: false });
    let err = extract_sections(llm, SAMPLE_PAPER, &sectioning_cfg(), &chunking_cfg(), "en")
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::SectioningFailed(_)));
}

#[tokio::test]
async fn test_exhausted_attempts_abort_document() {
    let llm = Arc::new(FailingLlm { transient: true });
    let cfg = SectioningConfig { max_attempts: 2, ..sectioning_cfg() };
    let err = extract_sections(llm, SAMPLE_PAPER, &cfg, &chunking_cfg(), "en")
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::SectioningFailed(_)));
}
