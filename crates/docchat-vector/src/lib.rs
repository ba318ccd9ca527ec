//! DocChat Vector - in-process ANN index and embedding clients
//!
//! [`VectorIndex`] pairs an HNSW graph with a chunk docstore behind a single
//! `RwLock`: searches take snapshot-consistent read guards, mutations are
//! serialized through the write guard. Entry ids come from a monotonic
//! counter that survives persistence, so an id is never reused after its
//! chunk is deleted.

pub mod embedding;
pub mod hnsw;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};
pub use hnsw::{cosine_similarity, HnswGraph};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use docchat_core::{Chunk, DocChatError, IndexConfig, Result, ScoredChunk};

/// Stable identifier of an indexed chunk
pub type EntryId = u64;

const INDEX_FILE: &str = "index.json";

/// A conjunction of metadata equality conditions.
///
/// A chunk matches when every condition key is present in its metadata with
/// exactly the given value. The empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataFilter {
    conditions: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`
    pub fn must_match(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.conditions
            .iter()
            .all(|(key, value)| metadata.get(key).map(|v| v == value).unwrap_or(false))
    }
}

/// Everything that goes to disk as one bundle
#[derive(Debug, Serialize, Deserialize)]
struct IndexState {
    graph: HnswGraph,
    docstore: HashMap<EntryId, Chunk>,
    next_id: EntryId,
    dimension: usize,
}

/// The vector index: HNSW graph plus chunk payloads.
///
/// All operations are safe to call concurrently through a shared reference.
#[derive(Debug)]
pub struct VectorIndex {
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index for embeddings of the given dimension
    pub fn new(dimension: usize, config: &IndexConfig) -> Self {
        let graph = HnswGraph::new(dimension, config.m, config.ef_construction, config.ef_search);
        Self {
            state: RwLock::new(IndexState {
                graph,
                docstore: HashMap::new(),
                next_id: 0,
                dimension,
            }),
        }
    }

    /// Insert chunks with their embeddings, returning the assigned ids in
    /// input order.
    ///
    /// The batch is validated up front and either fully applied or fully
    /// rejected; a dimension mismatch anywhere leaves the index unchanged.
    pub async fn insert(
        &self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<EntryId>> {
        if chunks.len() != embeddings.len() {
            return Err(DocChatError::Index(format!(
                "chunk/embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let mut state = self.state.write().await;

        for embedding in &embeddings {
            if embedding.len() != state.dimension {
                return Err(DocChatError::DimensionMismatch {
                    expected: state.dimension,
                    actual: embedding.len(),
                });
            }
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let id = state.next_id;
            state.next_id += 1;
            state.graph.insert(id, embedding)?;
            state.docstore.insert(id, chunk);
            ids.push(id);
        }

        debug!(inserted = ids.len(), total = state.docstore.len(), "indexed chunks");
        Ok(ids)
    }

    /// Delete entries by id. Unknown ids are ignored; returns how many
    /// entries were actually removed.
    pub async fn delete(&self, ids: &[EntryId]) -> Result<usize> {
        let mut state = self.state.write().await;

        let mut removed = 0;
        for &id in ids {
            if state.graph.remove(id) {
                state.docstore.remove(&id);
                removed += 1;
            }
        }

        debug!(requested = ids.len(), removed, "deleted index entries");
        Ok(removed)
    }

    /// Find the `k` chunks most similar to `embedding`, best first.
    ///
    /// With a filter, the candidate beam is widened before filtering so that
    /// non-matching chunks never displace matching ones.
    pub async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;

        let filtering = filter.map(|f| !f.is_empty()).unwrap_or(false);
        let fetch = if filtering { k.saturating_mul(4) } else { k };
        let ef = fetch.max(state.graph.ef_search());

        let candidates = state.graph.search(embedding, fetch, ef)?;

        let mut results = Vec::with_capacity(k);
        for (id, score) in candidates {
            let chunk = match state.docstore.get(&id) {
                Some(chunk) => chunk,
                None => continue,
            };
            if let Some(f) = filter {
                if !f.matches(&chunk.metadata) {
                    continue;
                }
            }
            results.push(ScoredChunk {
                chunk: chunk.clone(),
                score,
            });
            if results.len() == k {
                break;
            }
        }

        Ok(results)
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.state.read().await.docstore.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.docstore.is_empty()
    }

    /// Dimension this index was created for
    pub async fn dimension(&self) -> usize {
        self.state.read().await.dimension
    }

    /// Write the index to `dir` as a single JSON bundle, creating the
    /// directory if needed. Overwrites any previous bundle.
    pub async fn persist(&self, dir: &Path) -> Result<()> {
        let state = self.state.read().await;

        let bytes = serde_json::to_vec(&*state)
            .map_err(|e| DocChatError::Index(format!("failed to serialize index: {e}")))?;

        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            DocChatError::Index(format!("failed to create {}: {e}", dir.display()))
        })?;

        let file = dir.join(INDEX_FILE);
        tokio::fs::write(&file, bytes).await.map_err(|e| {
            DocChatError::Index(format!("failed to write {}: {e}", file.display()))
        })?;

        info!(path = %file.display(), entries = state.docstore.len(), "persisted index");
        Ok(())
    }

    /// Load a persisted index from `dir`, verifying it was built for
    /// embeddings of `dimension`.
    pub async fn load(dir: &Path, dimension: usize) -> Result<Self> {
        let file = dir.join(INDEX_FILE);
        let bytes = tokio::fs::read(&file).await.map_err(|e| {
            DocChatError::Index(format!("failed to read {}: {e}", file.display()))
        })?;

        let state: IndexState = serde_json::from_slice(&bytes)
            .map_err(|e| DocChatError::Index(format!("failed to parse {}: {e}", file.display())))?;

        if state.dimension != dimension {
            return Err(DocChatError::DimensionMismatch {
                expected: dimension,
                actual: state.dimension,
            });
        }

        info!(path = %file.display(), entries = state.docstore.len(), "loaded index");
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IndexConfig {
        IndexConfig::default()
    }

    fn chunk(text: &str, source: &str) -> Chunk {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.to_string());
        Chunk::new(text, metadata)
    }

    fn unit(angle: f32) -> Vec<f32> {
        vec![angle.cos(), angle.sin()]
    }

    #[tokio::test]
    async fn test_insert_then_search() {
        let index = VectorIndex::new(2, &config());

        let ids = index
            .insert(
                vec![
                    chunk("red", "colors.md"),
                    chunk("green", "colors.md"),
                    chunk("blue", "colors.md"),
                ],
                vec![unit(0.0), unit(1.0), unit(2.0)],
            )
            .await
            .unwrap();
        assert_eq!(ids, vec![0, 1, 2]);

        let results = index.search(&unit(0.1), 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "red");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_counted() {
        let index = VectorIndex::new(2, &config());
        let ids = index
            .insert(
                vec![chunk("a", "a.md"), chunk("b", "b.md")],
                vec![unit(0.0), unit(1.0)],
            )
            .await
            .unwrap();

        assert_eq!(index.delete(&[ids[0], 999]).await.unwrap(), 1);
        assert_eq!(index.delete(&[ids[0]]).await.unwrap(), 0);
        assert_eq!(index.len().await, 1);

        let results = index.search(&unit(0.0), 5, None).await.unwrap();
        assert!(results.iter().all(|r| r.chunk.text != "a"));
    }

    #[tokio::test]
    async fn test_ids_never_reused() {
        let index = VectorIndex::new(2, &config());
        let first = index
            .insert(vec![chunk("a", "a.md")], vec![unit(0.0)])
            .await
            .unwrap();
        index.delete(&first).await.unwrap();

        let second = index
            .insert(vec![chunk("b", "b.md")], vec![unit(1.0)])
            .await
            .unwrap();
        assert!(second[0] > first[0]);
    }

    #[tokio::test]
    async fn test_filter_excludes_other_sources() {
        let index = VectorIndex::new(2, &config());
        index
            .insert(
                vec![
                    chunk("from a", "a.md"),
                    chunk("from b", "b.md"),
                    chunk("also a", "a.md"),
                ],
                vec![unit(0.0), unit(0.01), unit(0.02)],
            )
            .await
            .unwrap();

        let filter = MetadataFilter::new().must_match("source", "a.md");
        let results = index.search(&unit(0.0), 10, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.chunk.source() == Some("a.md")));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_whole_batch() {
        let index = VectorIndex::new(2, &config());
        let err = index
            .insert(
                vec![chunk("ok", "a.md"), chunk("bad", "a.md")],
                vec![unit(0.0), vec![1.0, 2.0, 3.0]],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocChatError::DimensionMismatch { .. }));
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test]
    async fn test_persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");

        let index = VectorIndex::new(2, &config());
        index
            .insert(
                vec![chunk("persisted", "p.md"), chunk("gone", "g.md")],
                vec![unit(0.5), unit(2.5)],
            )
            .await
            .unwrap();
        index.delete(&[1]).await.unwrap();
        index.persist(&path).await.unwrap();

        let loaded = VectorIndex::load(&path, 2).await.unwrap();
        assert_eq!(loaded.len().await, 1);

        let results = loaded.search(&unit(0.5), 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "persisted");

        // Counter survives the round trip
        let ids = loaded
            .insert(vec![chunk("new", "n.md")], vec![unit(1.0)])
            .await
            .unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_load_checks_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");

        let index = VectorIndex::new(2, &config());
        index.persist(&path).await.unwrap();

        let err = VectorIndex::load(&path, 768).await.unwrap_err();
        assert!(matches!(
            err,
            DocChatError::DimensionMismatch {
                expected: 768,
                actual: 2
            }
        ));
    }
}
