//! RSE parameters and presets.

use serde::{Deserialize, Serialize};

use strata_common::{Result, StrataError};

/// Tunables for relevance synthesis and segment selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RseParams {
    /// Maximum segment length, in chunks.
    pub max_length: usize,
    /// Budget for the combined length of all returned segments, before
    /// the per-query extension.
    pub overall_max_length: usize,
    /// Segments scoring below this are discarded.
    pub minimum_value: f32,
    /// Baseline relevance of a chunk no query hit. Positive; applied
    /// negated.
    pub irrelevant_chunk_penalty: f32,
    /// Added to `overall_max_length` once per query beyond the first.
    pub overall_max_length_extension: usize,
    /// Rank decay: a hit at 0-based rank r contributes
    /// `max(0, similarity - minimum_similarity) * exp(-decay_rate * r)`.
    pub decay_rate: f32,
    /// Similarity floor subtracted before decay.
    pub minimum_similarity: f32,
    /// How many leading hits of each reranked list nominate candidate
    /// documents.
    pub top_k_for_document_selection: usize,
    /// Scale each chunk's relevance by `min(1, chunk_chars / reference_chunk_chars)`
    /// so degenerate short chunks cannot outweigh substantive ones.
    pub chunk_length_adjustment: bool,
    pub reference_chunk_chars: usize,
}

impl RseParams {
    pub fn balanced() -> Self {
        Self {
            max_length: 15,
            overall_max_length: 30,
            minimum_value: 0.5,
            irrelevant_chunk_penalty: 0.18,
            overall_max_length_extension: 5,
            decay_rate: 0.1,
            minimum_similarity: 0.0,
            top_k_for_document_selection: 10,
            chunk_length_adjustment: true,
            reference_chunk_chars: 800,
        }
    }

    pub fn precise() -> Self {
        Self {
            max_length: 10,
            overall_max_length: 20,
            minimum_value: 0.7,
            irrelevant_chunk_penalty: 0.2,
            decay_rate: 0.2,
            ..Self::balanced()
        }
    }

    pub fn comprehensive() -> Self {
        Self {
            max_length: 30,
            overall_max_length: 50,
            minimum_value: 0.3,
            irrelevant_chunk_penalty: 0.12,
            decay_rate: 0.05,
            top_k_for_document_selection: 15,
            ..Self::balanced()
        }
    }

    /// Resolve a preset by name. Unknown names are a hard error.
    pub fn from_preset(name: &str) -> Result<Self> {
        match name {
            "balanced" => Ok(Self::balanced()),
            "precise" => Ok(Self::precise()),
            "comprehensive" => Ok(Self::comprehensive()),
            other => Err(StrataError::Validation(format!("unknown rse preset `{other}`"))),
        }
    }

    /// The combined-length budget for an `n_queries`-query request.
    pub fn effective_overall_max_length(&self, n_queries: usize) -> usize {
        self.overall_max_length
            + self.overall_max_length_extension * n_queries.saturating_sub(1)
    }
}

impl Default for RseParams {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Sparse parameter overrides; unset fields fall back to `balanced`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RseParamsUpdate {
    pub max_length: Option<usize>,
    pub overall_max_length: Option<usize>,
    pub minimum_value: Option<f32>,
    pub irrelevant_chunk_penalty: Option<f32>,
    pub overall_max_length_extension: Option<usize>,
    pub decay_rate: Option<f32>,
    pub minimum_similarity: Option<f32>,
    pub top_k_for_document_selection: Option<usize>,
    pub chunk_length_adjustment: Option<bool>,
    pub reference_chunk_chars: Option<usize>,
}

impl RseParamsUpdate {
    pub fn resolve(&self) -> RseParams {
        let base = RseParams::balanced();
        RseParams {
            max_length: self.max_length.unwrap_or(base.max_length),
            overall_max_length: self.overall_max_length.unwrap_or(base.overall_max_length),
            minimum_value: self.minimum_value.unwrap_or(base.minimum_value),
            irrelevant_chunk_penalty: self
                .irrelevant_chunk_penalty
                .unwrap_or(base.irrelevant_chunk_penalty),
            overall_max_length_extension: self
                .overall_max_length_extension
                .unwrap_or(base.overall_max_length_extension),
            decay_rate: self.decay_rate.unwrap_or(base.decay_rate),
            minimum_similarity: self.minimum_similarity.unwrap_or(base.minimum_similarity),
            top_k_for_document_selection: self
                .top_k_for_document_selection
                .unwrap_or(base.top_k_for_document_selection),
            chunk_length_adjustment: self
                .chunk_length_adjustment
                .unwrap_or(base.chunk_length_adjustment),
            reference_chunk_chars: self
                .reference_chunk_chars
                .unwrap_or(base.reference_chunk_chars),
        }
    }
}

/// What a caller may pass as `rse_params`: a preset name or a sparse
/// override map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RseParamsInput {
    Preset(String),
    Update(RseParamsUpdate),
}

impl Default for RseParamsInput {
    fn default() -> Self {
        RseParamsInput::Preset("balanced".to_string())
    }
}

impl RseParamsInput {
    pub fn resolve(&self) -> Result<RseParams> {
        match self {
            RseParamsInput::Preset(name) => RseParams::from_preset(name),
            RseParamsInput::Update(update) => Ok(update.resolve()),
        }
    }
}
