//! Meta-document construction.
//!
//! The meta-document is the virtual concatenation of every candidate
//! document's chunks, addressed by a single integer offset. Candidate
//! documents are nominated by the leading hits of each reranked list, in
//! order of first appearance, and sized by their chunk counts.

use std::collections::{BTreeMap, HashMap};

use strata_common::RankedResult;

#[derive(Debug, Clone, Default)]
pub struct MetaDocument {
    doc_ids: Vec<String>,
    /// Cumulative chunk count through each document; `splits[i]` is the
    /// exclusive end address of document `i`.
    splits: Vec<u32>,
    start_points: HashMap<String, u32>,
}

impl MetaDocument {
    /// Fold reranked lists into a meta-document.
    ///
    /// Only the first `top_k_for_document_selection` hits of each list
    /// nominate documents. `chunk_counts` supplies the chunk count per
    /// candidate doc; docs without a count (or with zero chunks) are
    /// excluded.
    pub fn build(
        all_ranked_results: &[Vec<RankedResult>],
        top_k_for_document_selection: usize,
        chunk_counts: &BTreeMap<String, u32>,
    ) -> Self {
        let mut meta = MetaDocument::default();
        let mut total = 0u32;
        for list in all_ranked_results {
            for hit in list.iter().take(top_k_for_document_selection) {
                if meta.start_points.contains_key(&hit.doc_id) {
                    continue;
                }
                let Some(&count) = chunk_counts.get(&hit.doc_id) else {
                    continue;
                };
                if count == 0 {
                    continue;
                }
                meta.start_points.insert(hit.doc_id.clone(), total);
                total += count;
                meta.splits.push(total);
                meta.doc_ids.push(hit.doc_id.clone());
            }
        }
        meta
    }

    /// Total number of meta-addresses.
    pub fn len(&self) -> usize {
        self.splits.last().copied().unwrap_or(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn doc_count(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    pub fn doc_id(&self, doc_index: usize) -> &str {
        &self.doc_ids[doc_index]
    }

    /// Half-open meta-address range `[start, end)` of document `doc_index`.
    pub fn doc_range(&self, doc_index: usize) -> (usize, usize) {
        let start = if doc_index == 0 { 0 } else { self.splits[doc_index - 1] as usize };
        (start, self.splits[doc_index] as usize)
    }

    /// Meta-address of a hit, or `None` when its document is not part of
    /// the meta-document or the chunk index is out of range (stale
    /// vector entries).
    pub fn address_of(&self, hit: &RankedResult) -> Option<usize> {
        let start = *self.start_points.get(&hit.doc_id)?;
        let doc_index = self.doc_index_of(start as usize)?;
        let (_, end) = self.doc_range(doc_index);
        let address = start as usize + hit.chunk_index as usize;
        (address < end).then_some(address)
    }

    /// Which document an address belongs to, by binary search over the
    /// cumulative splits.
    pub fn doc_index_of(&self, address: usize) -> Option<usize> {
        if address >= self.len() {
            return None;
        }
        Some(self.splits.partition_point(|&split| (split as usize) <= address))
    }

    /// Resolve an address to `(doc_index, chunk_index)`.
    pub fn resolve(&self, address: usize) -> Option<(usize, u32)> {
        let doc_index = self.doc_index_of(address)?;
        let (start, _) = self.doc_range(doc_index);
        Some((doc_index, (address - start) as u32))
    }
}
