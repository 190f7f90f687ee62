//! Windowing.
//!
//! Greedily packs the indexed lines into contiguous windows bounded by a
//! character budget. A window always holds at least one line, even when
//! that line alone exceeds the budget. Windows do not overlap; boundary
//! reconciliation happens after the per-window sectioning calls by
//! discarding each non-final window's terminal section.

use strata_common::{Line, Window};

/// Partition `lines` into windows of at most `max_chars_per_window`
/// characters, counting one separator per line.
pub fn build_windows(lines: &[Line], max_chars_per_window: usize) -> Vec<Window> {
    let mut windows = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let start = i;
        let mut chars = 0usize;
        let mut text = String::new();

        while i < lines.len() {
            let line_chars = lines[i].content.len() + 1;
            if i > start && chars + line_chars > max_chars_per_window {
                break;
            }
            if i > start {
                text.push('\n');
            }
            text.push_str(&lines[i].content);
            chars += line_chars;
            i += 1;
        }

        windows.push(Window {
            start_line: lines[start].line_no,
            end_line: lines[i - 1].line_no,
            text,
        });
    }

    windows
}
