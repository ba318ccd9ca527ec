//! DocChat Ingest - corpus ingestion for the vector index
//!
//! Turns a directory of documents into indexed chunks:
//! normalize markdown, split with overlap, embed, insert, persist.

pub mod chunker;
pub mod markdown;
pub mod pipeline;

pub use chunker::TextChunker;
pub use markdown::markdown_to_text;
pub use pipeline::{IngestPipeline, IngestReport};
