//! Section-aware chunker.
//!
//! Splits each section's content into chunks of at most `chunk_size`
//! characters, preferring splits at paragraph boundaries, then line
//! breaks, then sentence ends, then whitespace, with a hard cut as the
//! last resort. Short sections become a single chunk.

use tracing::debug;

use strata_common::config::ChunkingConfig;
use strata_common::Chunk;

use crate::sectioning::SectionedDocument;

/// Chunk every section of a document. Chunk indices are dense and
/// document-wide, in section order.
pub fn chunk_sections(
    doc_id: &str,
    sectioned: &SectionedDocument,
    cfg: &ChunkingConfig,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index = 0u32;

    for (section_index, (section, content)) in sectioned
        .sections
        .iter()
        .zip(sectioned.contents.iter())
        .enumerate()
    {
        let pieces = if content.len() < cfg.min_length_for_chunking {
            vec![content.clone()]
        } else {
            split_text(content, cfg.chunk_size)
        };

        for piece in pieces {
            if piece.is_empty() {
                continue;
            }
            chunks.push(Chunk {
                doc_id: doc_id.to_string(),
                chunk_index,
                section_index: section_index as u32,
                section_title: section.title.clone(),
                content: piece,
                embedding_text: String::new(),
                page_start: None,
                page_end: None,
                is_visual: false,
            });
            chunk_index += 1;
        }
    }

    debug!(doc_id, n_chunks = chunks.len(), "document chunked");
    chunks
}

/// Split `text` into trimmed pieces of at most `chunk_size` bytes.
fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > chunk_size {
        let cut = split_point(rest, chunk_size);
        let (piece, tail) = rest.split_at(cut);
        let piece = piece.trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        rest = tail.trim_start();
    }
    let last = rest.trim();
    if !last.is_empty() {
        pieces.push(last.to_string());
    }

    pieces
}

/// Best cut position within the first `chunk_size` bytes of `text`:
/// paragraph break, then newline, then sentence end, then whitespace,
/// then a hard cut at the nearest char boundary.
fn split_point(text: &str, chunk_size: usize) -> usize {
    let limit = floor_char_boundary(text, chunk_size);
    let window = &text[..limit];

    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return pos + 2;
        }
    }
    if let Some(pos) = window.rfind('\n') {
        if pos > 0 {
            return pos + 1;
        }
    }
    if let Some(pos) = window.rfind(". ") {
        if pos > 0 {
            return pos + 2;
        }
    }
    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            return pos + 1;
        }
    }
    limit.max(1)
}

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
