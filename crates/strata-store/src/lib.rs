//! strata-store — vector, chunk, page-image, and metadata storage.
//!
//! Each store is an async trait plus a local implementation that keeps
//! its state behind a `tokio::sync::RwLock` and persists it as JSON under
//! a knowledge base storage directory:
//!
//! ```text
//! <storage_directory>/
//!   chunk_storage/<kb_id>.json
//!   vector_storage/<kb_id>.json
//!   metadata/<kb_id>.json
//!   page_images/<kb_id>/<doc_id>/page_<n>.jpg
//! ```
//!
//! The local stores are safe under concurrent writers; callers that plug
//! in their own implementations must provide the same guarantee when
//! ingesting with more than one worker.

pub mod chunk;
pub mod file_system;
pub mod metadata;
pub mod vector;

pub use chunk::{BasicChunkStore, ChunkStore};
pub use file_system::{FileSystem, LocalFileSystem};
pub use metadata::{LocalMetadataStore, MetadataStore};
pub use vector::{BasicVectorStore, VectorStore, CHUNK_TEXT_KEY};
