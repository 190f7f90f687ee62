//! strata-kb — the knowledge base facade.
//!
//! Composes providers and stores into a `KnowledgeBase` with the full
//! document lifecycle: ingest (sectioning, chunking, AutoContext,
//! embedding, transactional store writes), batch ingest over a worker
//! pool, querying with Relevant Segment Extraction, and deletion down to
//! the last on-disk artifact. KB configuration persists through the
//! metadata store and re-hydrates by component record.

pub mod components;
pub mod ingest;
pub mod knowledge_base;
pub mod progress;
pub mod retrieve;
pub mod segments;

pub use components::{ComponentOverrides, Components};
pub use ingest::IngestOutcome;
pub use knowledge_base::{KbConfig, KnowledgeBase, DEFAULT_RATE_LIMIT_PAUSE};
pub use progress::{IngestProgress, IngestStage};
