//! Line indexing.
//!
//! Numbers every non-empty line of a document, producing the canonical
//! `(line_no -> text)` map the sectioning model addresses. Empty and
//! whitespace-only lines are discarded; numbering is dense and 0-based.

use strata_common::Line;

/// Index a document's lines.
///
/// Returns the line list and a parallel map from line number to the byte
/// offset of that line in the original text, for downstream artifact
/// resolution.
pub fn index_lines(text: &str) -> (Vec<Line>, Vec<usize>) {
    let mut lines = Vec::new();
    let mut offsets = Vec::new();
    let mut offset = 0usize;

    for raw in text.split('\n') {
        let content = raw.strip_suffix('\r').unwrap_or(raw);
        if !content.trim().is_empty() {
            lines.push(Line {
                line_no: lines.len() as u32,
                content: content.to_string(),
            });
            offsets.push(offset);
        }
        offset += raw.len() + 1;
    }

    (lines, offsets)
}

/// Materialize the text of a line range (inclusive).
pub fn join_lines(lines: &[Line], start_line: u32, end_line: u32) -> String {
    lines
        .iter()
        .filter(|l| l.line_no >= start_line && l.line_no <= end_line)
        .map(|l| l.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
