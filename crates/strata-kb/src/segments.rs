//! Segment materialization.
//!
//! Turns selected meta-address intervals into user-visible segments:
//! text (chunk contents under a document header) or page-image paths,
//! with `dynamic` choosing per segment and a text fallback when no image
//! files exist.

use tracing::debug;

use strata_common::{ReturnMode, Result, Segment, SegmentContent, StrataError};
use strata_rse::{MetaDocument, ScoredSegment};

use crate::components::Components;

pub(crate) async fn materialize_segment(
    kb_id: &str,
    components: &Components,
    meta: &MetaDocument,
    segment: &ScoredSegment,
    return_mode: ReturnMode,
) -> Result<Segment> {
    let (doc_index, chunk_start) = meta
        .resolve(segment.start)
        .ok_or_else(|| StrataError::Store("segment outside the meta-document".to_string()))?;
    let doc_id = meta.doc_id(doc_index).to_string();
    let chunk_end = chunk_start + segment.len() as u32;

    let (page_start, _) = components
        .chunk_store
        .get_chunk_page_numbers(&doc_id, chunk_start)
        .await?;
    let (_, page_end) = components
        .chunk_store
        .get_chunk_page_numbers(&doc_id, chunk_end - 1)
        .await?;

    let mode = match return_mode {
        ReturnMode::Dynamic => {
            let mut visual = false;
            for index in chunk_start..chunk_end {
                if components.chunk_store.get_is_visual(&doc_id, index).await? {
                    visual = true;
                    break;
                }
            }
            if visual { ReturnMode::PageImages } else { ReturnMode::Text }
        }
        other => other,
    };

    if mode == ReturnMode::PageImages {
        if let (Some(start), Some(end)) = (page_start, page_end) {
            let files = components
                .file_system
                .get_files(kb_id, &doc_id, start, end)
                .await?;
            if !files.is_empty() {
                return Ok(Segment {
                    doc_id,
                    chunk_start,
                    chunk_end,
                    content: SegmentContent::PageImages(files),
                    segment_page_start: page_start,
                    segment_page_end: page_end,
                    score: segment.score,
                });
            }
        }
        debug!(doc_id, "no page images for segment, falling back to text");
    }

    let text = segment_text(components, &doc_id, chunk_start, chunk_end).await?;
    Ok(Segment {
        doc_id,
        chunk_start,
        chunk_end,
        content: SegmentContent::Text(text),
        segment_page_start: page_start,
        segment_page_end: page_end,
        score: segment.score,
    })
}

async fn segment_text(
    components: &Components,
    doc_id: &str,
    chunk_start: u32,
    chunk_end: u32,
) -> Result<String> {
    let title = components
        .chunk_store
        .get_document_title(doc_id)
        .await?
        .unwrap_or_default();
    let summary = components
        .chunk_store
        .get_document_summary(doc_id)
        .await?
        .unwrap_or_default();

    let mut parts = Vec::new();
    let header = segment_header(&title, &summary);
    if !header.is_empty() {
        parts.push(header);
    }
    for index in chunk_start..chunk_end {
        if let Some(text) = components.chunk_store.get_chunk_text(doc_id, index).await? {
            parts.push(text);
        }
    }
    Ok(parts.join("\n\n").trim().to_string())
}

/// The header prefixed to every text segment: document title and summary,
/// empty parts elided.
pub fn segment_header(document_title: &str, document_summary: &str) -> String {
    [document_title, document_summary]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_header_elides_empty_summary() {
        assert_eq!(segment_header("Title", ""), "Title");
        assert_eq!(segment_header("Title", "Summary"), "Title\n\nSummary");
        assert_eq!(segment_header("", ""), "");
    }
}
