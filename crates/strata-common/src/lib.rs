//! strata-common — shared data model and error taxonomy.
//!
//! Everything the other strata crates agree on lives here: the line /
//! window / section / chunk types produced by ingestion, the ranked
//! result and segment types produced by retrieval, metadata filters,
//! and the per-document configuration structs.

pub mod config;
pub mod error;
pub mod filter;
pub mod record;
pub mod types;

pub use error::{ProviderError, Result, StrataError};
pub use filter::{FilterOperator, FilterValue, MetadataFilter, MetadataValue};
pub use record::ComponentRecord;
pub use types::*;
