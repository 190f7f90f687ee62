//! Per-chunk relevance synthesis.
//!
//! Every meta-address starts at the negated irrelevant-chunk penalty.
//! Each reranked hit adds its similarity, floored by `minimum_similarity`
//! and decayed by rank, to its address. Hits from different query lists
//! accumulate, so chunks that several queries agree on stand out.

use strata_common::RankedResult;

use crate::meta::MetaDocument;
use crate::params::RseParams;

/// Compute the relevance vector over the meta-document.
///
/// `chunk_lengths`, when given, must be aligned with meta-addresses and
/// enables the chunk-length adjustment: values are scaled by
/// `min(1, len / reference_chunk_chars)` so that a near-empty chunk with
/// a high similarity cannot dominate segment selection.
pub fn relevance_values(
    all_ranked_results: &[Vec<RankedResult>],
    meta: &MetaDocument,
    params: &RseParams,
    chunk_lengths: Option<&[u32]>,
) -> Vec<f32> {
    let mut values = vec![-params.irrelevant_chunk_penalty; meta.len()];

    for list in all_ranked_results {
        for (rank, hit) in list.iter().enumerate() {
            let Some(address) = meta.address_of(hit) else {
                continue;
            };
            let base = (hit.similarity - params.minimum_similarity).max(0.0);
            let contribution = base * (-params.decay_rate * rank as f32).exp();
            values[address] += contribution;
        }
    }

    if params.chunk_length_adjustment {
        if let Some(lengths) = chunk_lengths {
            let reference = params.reference_chunk_chars.max(1) as f32;
            for (value, &len) in values.iter_mut().zip(lengths.iter()) {
                *value *= (len as f32 / reference).min(1.0);
            }
        }
    }

    values
}
