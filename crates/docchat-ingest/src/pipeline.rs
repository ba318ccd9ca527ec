//! Ingestion pipeline
//!
//! Walks a corpus directory, normalizes and chunks each document, embeds the
//! chunks in one batch per file, and bulk-inserts them into the vector index.
//! Bad input up front (missing directory, malformed extension) fails fast;
//! a failure on an individual file skips that file and continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use docchat_core::{DocChatError, Document, RagConfig, Result};
use docchat_vector::{EmbeddingClient, VectorIndex};

use crate::chunker::TextChunker;
use crate::markdown::markdown_to_text;

/// Outcome summary of an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files fully chunked and indexed
    pub files_indexed: usize,
    /// Chunks added to the index
    pub chunks_indexed: usize,
    /// Files skipped after a read, embed, or index failure, with the cause
    pub skipped: Vec<(PathBuf, String)>,
}

/// Directory to index pipeline
pub struct IngestPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<VectorIndex>,
}

impl IngestPipeline {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<VectorIndex>,
    ) -> Result<Self> {
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            chunker,
            embedder,
            index,
        })
    }

    /// Ingest every file under `data_dir` whose name ends with `extension`
    /// (including a leading dot, e.g. `.md`).
    pub async fn run(&self, data_dir: &Path, extension: &str) -> Result<IngestReport> {
        if !extension.starts_with('.') {
            return Err(DocChatError::Ingest(format!(
                "extension must start with a dot, got {extension:?}"
            )));
        }
        if !data_dir.is_dir() {
            return Err(DocChatError::Ingest(format!(
                "{} is not a directory",
                data_dir.display()
            )));
        }

        let files = collect_files(data_dir, extension)?;
        info!(dir = %data_dir.display(), files = files.len(), "starting ingestion");

        let mut report = IngestReport::default();
        for file in files {
            match self.ingest_file(data_dir, &file, extension).await {
                Ok(chunks) => {
                    report.files_indexed += 1;
                    report.chunks_indexed += chunks;
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "skipping file");
                    report.skipped.push((file, e.to_string()));
                }
            }
        }

        info!(
            files = report.files_indexed,
            chunks = report.chunks_indexed,
            skipped = report.skipped.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Run ingestion, then persist the index to `index_path`
    pub async fn run_and_persist(
        &self,
        data_dir: &Path,
        extension: &str,
        index_path: &Path,
    ) -> Result<IngestReport> {
        let report = self.run(data_dir, extension).await?;
        self.index.persist(index_path).await?;
        Ok(report)
    }

    async fn ingest_file(
        &self,
        data_dir: &Path,
        path: &Path,
        extension: &str,
    ) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DocChatError::Ingest(format!("failed to read {}: {e}", path.display()))
        })?;

        let text = if matches!(extension, ".md" | ".markdown") {
            markdown_to_text(&raw)
        } else {
            raw
        };

        let source = path
            .strip_prefix(data_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        let chunks = self.chunker.chunk(&Document::new(text, source));
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let ids = self.index.insert(chunks, embeddings).await?;
        Ok(ids.len())
    }
}

/// Recursively collect matching files, sorted for a deterministic ingest
/// order
fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| {
            DocChatError::Ingest(format!("failed to read {}: {e}", current.display()))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                DocChatError::Ingest(format!("failed to read {}: {e}", current.display()))
            })?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.to_string_lossy().ends_with(extension) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
