//! Hierarchical navigable small world graph
//!
//! The ANN structure behind [`crate::VectorIndex`]: a multi-layer graph where
//! higher layers hold exponentially fewer nodes. Search greedily descends from
//! the sparse top layer, then runs a beam search over layer 0.
//!
//! Scores are cosine similarity throughout, higher is better. Deletions are
//! tombstones; deleted nodes keep routing traffic but never appear in results.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use docchat_core::{DocChatError, Result};

/// Euclidean norm of a vector
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with optional precomputed magnitudes.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32], mag_a: Option<f32>, mag_b: Option<f32>) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    let ma = mag_a.unwrap_or_else(|| magnitude(a));
    let mb = mag_b.unwrap_or_else(|| magnitude(b));

    if ma == 0.0 || mb == 0.0 {
        return 0.0;
    }

    dot / (ma * mb)
}

/// Heap entry ordered by score. NaN compares equal, which is acceptable
/// because cosine over finite vectors never produces it.
#[derive(Debug, Clone)]
struct ScoredId {
    score: f32,
    id: u64,
}

impl PartialEq for ScoredId {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// A single node: its vector, its neighbor lists per layer, and a tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphNode {
    id: u64,
    level: u8,
    vector: Vec<f32>,
    /// Norm cached at insert time, never recomputed
    magnitude: f32,
    /// `neighbors[l]` is the adjacency list at layer `l`, `0..=level`
    neighbors: Vec<Vec<u64>>,
    deleted: bool,
}

impl GraphNode {
    fn new(id: u64, level: u8, vector: Vec<f32>) -> Self {
        let magnitude = magnitude(&vector);
        let neighbors = vec![Vec::new(); level as usize + 1];
        Self {
            id,
            level,
            vector,
            magnitude,
            neighbors,
            deleted: false,
        }
    }
}

/// The graph itself. Serializable as a whole; [`crate::VectorIndex`] wraps it
/// together with the chunk docstore for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    /// Max neighbors per node per layer (M in the HNSW paper)
    m: usize,
    /// Max neighbors at layer 0 (2 * M)
    m_max0: usize,
    /// Beam width during construction
    ef_construction: usize,
    /// Default beam width during search
    ef_search: usize,
    /// Level generation multiplier, 1 / ln(M)
    level_mult: f32,
    dimension: usize,

    nodes: HashMap<u64, GraphNode>,
    entry_point_id: Option<u64>,
    level_max: u8,
    /// Nodes not tombstoned
    live_count: usize,

    /// LCG state for level selection; fixed seed keeps builds reproducible
    rng_state: u64,
}

impl HnswGraph {
    pub fn new(dimension: usize, m: usize, ef_construction: usize, ef_search: usize) -> Self {
        let level_mult = 1.0 / (m as f32).ln();
        Self {
            m,
            m_max0: m * 2,
            ef_construction,
            ef_search,
            level_mult,
            dimension,
            nodes: HashMap::new(),
            entry_point_id: None,
            level_max: 0,
            live_count: 0,
            rng_state: 42,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    /// Number of live (non-tombstoned) nodes
    pub fn live_len(&self) -> usize {
        self.live_count
    }

    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Insert a vector under a caller-assigned id.
    ///
    /// Fails on dimension mismatch, empty vectors, and id reuse. The graph is
    /// unchanged on error.
    pub fn insert(&mut self, id: u64, vector: Vec<f32>) -> Result<()> {
        if vector.is_empty() {
            return Err(DocChatError::Index("cannot index an empty vector".into()));
        }
        if vector.len() != self.dimension {
            return Err(DocChatError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.nodes.contains_key(&id) {
            return Err(DocChatError::Index(format!("duplicate graph id: {id}")));
        }

        let level = self.select_level();

        let mut ep_id = match self.entry_point_id {
            Some(ep) => ep,
            None => {
                self.nodes.insert(id, GraphNode::new(id, level, vector));
                self.entry_point_id = Some(id);
                self.level_max = level;
                self.live_count += 1;
                return Ok(());
            }
        };

        let query_mag = magnitude(&vector);

        // Greedy descent through the layers above the new node's level
        let mut layer = self.level_max as i32;
        while layer > level as i32 {
            ep_id = self.greedy_step(ep_id, &vector, query_mag, layer as u8, false);
            layer -= 1;
        }

        // Beam search at every layer the node participates in, collecting the
        // neighbor candidates before the node itself enters the map
        let top = level.min(self.level_max);
        let mut selected_per_layer: Vec<(u8, Vec<u64>)> = Vec::new();
        for lc in (0..=top).rev() {
            let candidates = self.beam_search(ep_id, &vector, query_mag, self.ef_construction, lc);
            if let Some(&(best, _)) = candidates.first() {
                ep_id = best;
            }
            let limit = if lc == 0 { self.m_max0 } else { self.m };
            let selected = candidates.iter().take(limit).map(|&(nid, _)| nid).collect();
            selected_per_layer.push((lc, selected));
        }

        self.nodes.insert(id, GraphNode::new(id, level, vector));
        self.live_count += 1;

        for (lc, selected) in selected_per_layer {
            let limit = if lc == 0 { self.m_max0 } else { self.m };
            for &neighbor_id in &selected {
                self.link(id, neighbor_id, lc);
                self.link(neighbor_id, id, lc);
            }
            for &neighbor_id in &selected {
                self.prune_neighbors(neighbor_id, lc, limit);
            }
        }

        if level > self.level_max {
            self.entry_point_id = Some(id);
            self.level_max = level;
        }

        Ok(())
    }

    /// Tombstone a node. Returns false if the id is unknown or already
    /// deleted.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if !node.deleted => {
                node.deleted = true;
                self.live_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Find the nearest live nodes to `query`, best first.
    ///
    /// `ef` widens the layer-0 beam; it is clamped below to `k` and the
    /// configured `ef_search`.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<(u64, f32)>> {
        if query.len() != self.dimension {
            return Err(DocChatError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut ep_id = match self.entry_point_id {
            Some(ep) => ep,
            None => return Ok(Vec::new()),
        };

        let query_mag = magnitude(query);

        let mut layer = self.level_max as i32;
        while layer > 0 {
            ep_id = self.greedy_step(ep_id, query, query_mag, layer as u8, true);
            layer -= 1;
        }

        let beam = ef.max(k).max(self.ef_search);
        let candidates = self.beam_search(ep_id, query, query_mag, beam, 0);

        Ok(candidates
            .into_iter()
            .filter(|(id, _)| self.nodes.get(id).map(|n| !n.deleted).unwrap_or(false))
            .take(k)
            .collect())
    }

    /// Next level drawn from the exponential distribution, capped at 16
    fn select_level(&mut self) -> u8 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        let r = ((self.rng_state >> 33) as f32 / (u32::MAX as f32)).max(1e-7);
        let level = (-r.ln() * self.level_mult).floor() as u8;
        level.min(16)
    }

    /// One greedy pass at a layer: follow the best-improving neighbor until
    /// no neighbor beats the current node.
    fn greedy_step(
        &self,
        entry_id: u64,
        query: &[f32],
        query_mag: f32,
        layer: u8,
        skip_deleted: bool,
    ) -> u64 {
        let mut current_id = entry_id;
        let mut current_sim = self.similarity(current_id, query, query_mag);

        loop {
            let mut changed = false;

            if let Some(node) = self.nodes.get(&current_id) {
                if let Some(neighbors) = node.neighbors.get(layer as usize) {
                    for &nid in neighbors {
                        if skip_deleted
                            && self.nodes.get(&nid).map(|n| n.deleted).unwrap_or(true)
                        {
                            continue;
                        }
                        let sim = self.similarity(nid, query, query_mag);
                        if sim > current_sim {
                            current_id = nid;
                            current_sim = sim;
                            changed = true;
                        }
                    }
                }
            }

            if !changed {
                return current_id;
            }
        }
    }

    /// Beam search at one layer, returning up to `ef` candidates sorted by
    /// similarity descending. Tombstoned nodes are traversed but the caller
    /// filters them from final results.
    fn beam_search(
        &self,
        entry_id: u64,
        query: &[f32],
        query_mag: f32,
        ef: usize,
        layer: u8,
    ) -> Vec<(u64, f32)> {
        let mut visited: HashSet<u64> = HashSet::new();

        // Frontier: max-heap, explore the most promising candidate first
        let mut frontier: BinaryHeap<ScoredId> = BinaryHeap::new();
        // Results: min-heap, so the worst kept candidate is on top
        let mut results: BinaryHeap<Reverse<ScoredId>> = BinaryHeap::new();

        let entry_sim = self.similarity(entry_id, query, query_mag);
        visited.insert(entry_id);
        frontier.push(ScoredId {
            score: entry_sim,
            id: entry_id,
        });
        results.push(Reverse(ScoredId {
            score: entry_sim,
            id: entry_id,
        }));

        while let Some(ScoredId { score, id }) = frontier.pop() {
            let worst = results
                .peek()
                .map(|r| r.0.score)
                .unwrap_or(f32::NEG_INFINITY);
            if score < worst && results.len() >= ef {
                break;
            }

            if let Some(node) = self.nodes.get(&id) {
                if let Some(neighbors) = node.neighbors.get(layer as usize) {
                    for &nid in neighbors {
                        if !visited.insert(nid) {
                            continue;
                        }

                        let sim = self.similarity(nid, query, query_mag);
                        let worst = results
                            .peek()
                            .map(|r| r.0.score)
                            .unwrap_or(f32::NEG_INFINITY);

                        if sim > worst || results.len() < ef {
                            frontier.push(ScoredId { score: sim, id: nid });
                            results.push(Reverse(ScoredId { score: sim, id: nid }));
                            if results.len() > ef {
                                results.pop();
                            }
                        }
                    }
                }
            }
        }

        let mut out: Vec<(u64, f32)> = results
            .into_iter()
            .map(|r| (r.0.id, r.0.score))
            .collect();
        out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Add a one-directional edge, growing the layer list if needed
    fn link(&mut self, from_id: u64, to_id: u64, layer: u8) {
        if let Some(node) = self.nodes.get_mut(&from_id) {
            while node.neighbors.len() <= layer as usize {
                node.neighbors.push(Vec::new());
            }
            let list = &mut node.neighbors[layer as usize];
            if !list.contains(&to_id) {
                list.push(to_id);
            }
        }
    }

    /// Drop the least-similar edges of a node until it is within the limit
    fn prune_neighbors(&mut self, node_id: u64, layer: u8, max_neighbors: usize) {
        let (vector, mag, neighbors) = match self.nodes.get(&node_id) {
            Some(node) => match node.neighbors.get(layer as usize) {
                Some(list) if list.len() > max_neighbors => {
                    (node.vector.clone(), node.magnitude, list.clone())
                }
                _ => return,
            },
            None => return,
        };

        let mut scored: Vec<(u64, f32)> = neighbors
            .iter()
            .map(|&nid| (nid, self.similarity(nid, &vector, mag)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let pruned: Vec<u64> = scored
            .into_iter()
            .take(max_neighbors)
            .map(|(nid, _)| nid)
            .collect();

        if let Some(node) = self.nodes.get_mut(&node_id) {
            if let Some(list) = node.neighbors.get_mut(layer as usize) {
                *list = pruned;
            }
        }
    }

    fn similarity(&self, node_id: u64, query: &[f32], query_mag: f32) -> f32 {
        match self.nodes.get(&node_id) {
            Some(node) => {
                cosine_similarity(&node.vector, query, Some(node.magnitude), Some(query_mag))
            }
            None => f32::NEG_INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(angle: f32) -> Vec<f32> {
        vec![angle.cos(), angle.sin()]
    }

    #[test]
    fn test_level_distribution_decays() {
        let mut graph = HnswGraph::new(4, 16, 100, 32);
        let mut counts = [0u32; 17];
        for _ in 0..10_000 {
            counts[graph.select_level() as usize] += 1;
        }
        assert!(counts[0] > 5_000, "layer 0 should dominate");
        assert!(counts[0] > counts[1]);
    }

    #[test]
    fn test_search_finds_nearest() {
        let mut graph = HnswGraph::new(2, 8, 32, 32);
        for i in 0..50u64 {
            graph.insert(i, unit(i as f32 * 0.1)).unwrap();
        }

        let results = graph.search(&unit(2.05), 3, 32).unwrap();
        assert_eq!(results.len(), 3);
        // Nearest to angle 2.05 are ids 20 and 21
        assert!(results[0].0 == 20 || results[0].0 == 21);
        // Best first
        assert!(results[0].1 >= results[1].1);
        assert!(results[1].1 >= results[2].1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut graph = HnswGraph::new(3, 8, 32, 32);
        let err = graph.insert(0, vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            DocChatError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        graph.insert(0, vec![1.0, 0.0, 0.0]).unwrap();
        assert!(graph.search(&[1.0, 0.0], 1, 32).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = HnswGraph::new(2, 8, 32, 32);
        graph.insert(7, vec![1.0, 0.0]).unwrap();
        assert!(graph.insert(7, vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_tombstoned_nodes_never_surface() {
        let mut graph = HnswGraph::new(2, 8, 32, 32);
        for i in 0..20u64 {
            graph.insert(i, unit(i as f32 * 0.3)).unwrap();
        }

        assert!(graph.remove(5));
        assert!(!graph.remove(5), "second delete is a no-op");
        assert!(!graph.remove(999));
        assert_eq!(graph.live_len(), 19);

        let results = graph.search(&unit(1.5), 20, 64).unwrap();
        assert!(results.iter().all(|&(id, _)| id != 5));
    }

    #[test]
    fn test_empty_graph_search() {
        let graph = HnswGraph::new(2, 8, 32, 32);
        assert!(graph.search(&[1.0, 0.0], 5, 32).unwrap().is_empty());
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0], None, None), 0.0);
    }
}
