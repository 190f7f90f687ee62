//! Segment selection over the relevance vector.
//!
//! Segments are half-open intervals of meta-addresses that never straddle
//! a document split. Selection is best-first: each round scores every
//! admissible interval of every document against prefix sums and takes
//! the highest-scoring one that still fits the overall budget, until
//! nothing above `minimum_value` remains. Ties break deterministically on
//! earlier start address, then shorter length, which also orders earlier
//! documents first.

use tracing::debug;

use crate::meta::MetaDocument;
use crate::params::RseParams;

/// A selected segment, in meta-address space.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSegment {
    pub doc_index: usize,
    /// Meta-address range, half-open.
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

impl ScoredSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &ScoredSegment) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Select the best non-overlapping segments under the length budgets.
///
/// `overall_max_length` is the *effective* budget, i.e. already extended
/// for multi-query requests. Returned segments are in descending score
/// order.
pub fn best_segments(
    values: &[f32],
    meta: &MetaDocument,
    params: &RseParams,
    overall_max_length: usize,
) -> Vec<ScoredSegment> {
    debug_assert_eq!(values.len(), meta.len());

    // prefix[i] = sum of values[..i]
    let mut prefix = Vec::with_capacity(values.len() + 1);
    let mut running = 0.0f32;
    prefix.push(running);
    for &v in values {
        running += v;
        prefix.push(running);
    }
    let score_of = |start: usize, end: usize| prefix[end] - prefix[start];

    let mut chosen: Vec<ScoredSegment> = Vec::new();
    let mut budget = overall_max_length;

    while budget > 0 {
        let mut best: Option<ScoredSegment> = None;
        for doc_index in 0..meta.doc_count() {
            let (doc_start, doc_end) = meta.doc_range(doc_index);
            for start in doc_start..doc_end {
                let longest = params.max_length.min(budget).min(doc_end - start);
                for len in 1..=longest {
                    let candidate = ScoredSegment {
                        doc_index,
                        start,
                        end: start + len,
                        score: score_of(start, start + len),
                    };
                    if candidate.score < params.minimum_value {
                        continue;
                    }
                    if chosen.iter().any(|c| c.overlaps(&candidate)) {
                        continue;
                    }
                    let improves = match &best {
                        None => true,
                        Some(b) => match candidate.score.total_cmp(&b.score) {
                            std::cmp::Ordering::Greater => true,
                            std::cmp::Ordering::Less => false,
                            std::cmp::Ordering::Equal => {
                                (candidate.start, candidate.len()) < (b.start, b.len())
                            }
                        },
                    };
                    if improves {
                        best = Some(candidate);
                    }
                }
            }
        }
        match best {
            Some(segment) => {
                budget -= segment.len();
                chosen.push(segment);
            }
            None => break,
        }
    }

    debug!(
        n_segments = chosen.len(),
        used = overall_max_length - budget,
        budget = overall_max_length,
        "segment selection complete"
    );
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use strata_common::RankedResult;

    fn hit(doc: &str, idx: u32, sim: f32) -> RankedResult {
        RankedResult {
            doc_id: doc.to_string(),
            chunk_index: idx,
            similarity: sim,
            text: None,
        }
    }

    /// A meta-document over the given `(doc, chunk_count)` pairs, in order.
    fn meta_over(docs: &[(&str, u32)]) -> MetaDocument {
        let counts: BTreeMap<String, u32> =
            docs.iter().map(|(d, n)| (d.to_string(), *n)).collect();
        let nominations: Vec<RankedResult> =
            docs.iter().map(|(d, _)| hit(d, 0, 1.0)).collect();
        MetaDocument::build(&[nominations], docs.len(), &counts)
    }

    fn params(max_length: usize, minimum_value: f32) -> RseParams {
        RseParams {
            max_length,
            minimum_value,
            ..RseParams::balanced()
        }
    }

    #[test]
    fn test_picks_hand_computable_optimum() {
        let meta = meta_over(&[("a", 6)]);
        // Best run is [1, 4): 0.8 + 0.9 + 0.7 = 2.4.
        let values = [-0.2, 0.8, 0.9, 0.7, -0.2, -0.2];
        let segments = best_segments(&values, &meta, &params(3, 0.5), 10);
        assert_eq!(segments[0].start, 1);
        assert_eq!(segments[0].end, 4);
        assert!((segments[0].score - 2.4).abs() < 1e-6);
    }

    #[test]
    fn test_never_crosses_document_split() {
        let meta = meta_over(&[("a", 2), ("b", 2)]);
        // The highest-value 2-run, [1, 3), would straddle the split at
        // address 2 and must never be produced.
        let values = [0.1, 0.9, 0.9, 0.1];
        let segments = best_segments(&values, &meta, &params(2, 0.5), 10);
        assert_eq!(segments.len(), 2);
        for s in &segments {
            let (doc_start, doc_end) = meta.doc_range(s.doc_index);
            assert!(s.start >= doc_start && s.end <= doc_end);
        }
        assert_eq!((segments[0].start, segments[0].end), (0, 2));
        assert_eq!((segments[1].start, segments[1].end), (2, 4));
    }

    #[test]
    fn test_overall_budget_caps_total_length() {
        let meta = meta_over(&[("a", 10)]);
        let values = [0.6; 10];
        let segments = best_segments(&values, &meta, &params(4, 0.5), 6);
        let total: usize = segments.iter().map(|s| s.len()).sum();
        assert!(total <= 6);
    }

    #[test]
    fn test_minimum_value_filters_weak_segments() {
        let meta = meta_over(&[("a", 4)]);
        let values = [0.2, -0.1, 0.1, 0.05];
        let segments = best_segments(&values, &meta, &params(4, 0.5), 10);
        assert!(segments.is_empty());
    }

    #[test]
    fn test_descending_score_order() {
        let meta = meta_over(&[("a", 3), ("b", 3)]);
        let values = [0.6, -0.2, -0.2, 0.9, -0.2, -0.2];
        let segments = best_segments(&values, &meta, &params(1, 0.5), 10);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].score >= segments[1].score);
        assert_eq!(segments[0].doc_index, 1);
    }

    #[test]
    fn test_tie_breaks_on_earlier_address() {
        let meta = meta_over(&[("a", 2), ("b", 2)]);
        let values = [0.7, -0.2, 0.7, -0.2];
        let segments = best_segments(&values, &meta, &params(1, 0.5), 10);
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments[1].start, 2);
    }

    #[test]
    fn test_two_queries_two_documents_budget_extension() {
        // Two top hits on different documents; budget extended for the
        // second query leaves room for both segments.
        let meta = meta_over(&[("a", 3), ("b", 3)]);
        let mut values = vec![-0.2; 6];
        values[0] = 0.9;
        values[3] = 0.8;
        let p = params(3, 0.5);
        let overall = RseParams { overall_max_length: 5, ..p.clone() }
            .effective_overall_max_length(2);
        assert_eq!(overall, 10);
        let segments = best_segments(&values, &meta, &p, overall);
        assert_eq!(segments.len(), 2);
        let total: usize = segments.iter().map(|s| s.len()).sum();
        assert!(total <= 10);
        assert!(segments[0].score > segments[1].score);
        assert_eq!(meta.doc_id(segments[0].doc_index), "a");
        assert_eq!(meta.doc_id(segments[1].doc_index), "b");
    }

    #[test]
    fn test_empty_meta_document() {
        let meta = MetaDocument::default();
        let segments = best_segments(&[], &meta, &params(3, 0.5), 10);
        assert!(segments.is_empty());
    }
}
