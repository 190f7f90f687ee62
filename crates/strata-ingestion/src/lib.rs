//! strata-ingestion — document decomposition.
//!
//! Turns raw text into an indexed, embeddable chunk list in four steps:
//! line indexing, windowed semantic sectioning (parallel structured LLM
//! calls with a consolidation safeguard), section chunking, and
//! AutoContext annotation of each chunk's embedding text.

pub mod autocontext;
pub mod chunker;
pub mod lines;
pub mod sectioning;
pub mod windows;

pub use autocontext::{chunk_header, DocumentContext, TermMapper};
pub use chunker::chunk_sections;
pub use lines::index_lines;
pub use sectioning::{extract_sections, SectionedDocument};
pub use windows::build_windows;
