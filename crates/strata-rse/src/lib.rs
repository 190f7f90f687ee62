//! strata-rse — Relevant Segment Extraction.
//!
//! Folds the reranked result lists of a query set into a virtual
//! "meta-document" of candidate chunks, synthesizes a per-chunk relevance
//! value from rank-decayed similarities, and selects the best
//! non-overlapping chunk ranges under length budgets.
//!
//! Everything here is pure and synchronous; retrieval and store access
//! happen in `strata-kb`.

pub mod meta;
pub mod optimize;
pub mod params;
pub mod relevance;

pub use meta::MetaDocument;
pub use optimize::{best_segments, ScoredSegment};
pub use params::{RseParams, RseParamsInput, RseParamsUpdate};
pub use relevance::relevance_values;
