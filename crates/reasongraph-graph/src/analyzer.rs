use reasongraph_ai::SemanticJudge;
use reasongraph_core::{AnalysisConfig, NodeId, NodeStore, NodeType, ReasonGraphError, Result};
use reasongraph_vector::{children_similarity, EmbeddingGenerator, EmbeddingIndex, SimilarityWeights};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Two nodes confirmed equivalent, in the order the scan found them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquivalentPair {
    pub first: NodeId,
    pub second: NodeId,
    pub similarity: f32,
}

impl EquivalentPair {
    pub fn new(first: impl Into<NodeId>, second: impl Into<NodeId>, similarity: f32) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            similarity,
        }
    }
}

/// Node, children and combined similarity of one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairScore {
    pub node: f32,
    pub children: f32,
    pub combined: f32,
}

/// One row of the candidate diagnostic for a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAnalysis {
    pub candidate_id: NodeId,
    pub candidate_summary: String,
    pub node_similarity: f32,
    pub children_similarity: f32,
    pub combined_similarity: f32,
    pub above_threshold: bool,
    pub node_type: NodeType,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeActivity {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimilarityStatistics {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub by_node_type: BTreeMap<String, TypeActivity>,
}

/// Finds equivalent nodes without changing the graph structure.
///
/// Scanning only writes the per-node embedding cache. Merging is the
/// pruner's job; it reaches the store through [`NodeAnalyzer::store_mut`].
pub struct NodeAnalyzer {
    store: NodeStore,
    embeddings: EmbeddingGenerator,
    judge: Arc<dyn SemanticJudge>,
    config: AnalysisConfig,
    weights: SimilarityWeights,
    index: Option<EmbeddingIndex>,
}

impl NodeAnalyzer {
    pub fn new(
        store: NodeStore,
        embeddings: EmbeddingGenerator,
        judge: Arc<dyn SemanticJudge>,
        config: AnalysisConfig,
    ) -> Self {
        let weights = SimilarityWeights::from(&config);
        Self {
            store,
            embeddings,
            judge,
            config,
            weights,
            index: None,
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    pub fn into_store(self) -> NodeStore {
        self.store
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn judge(&self) -> &Arc<dyn SemanticJudge> {
        &self.judge
    }

    /// Index from the most recent embedding pass, if any.
    pub fn index(&self) -> Option<&EmbeddingIndex> {
        self.index.as_ref()
    }

    /// Embed every active node, cache the normalized vectors on the nodes
    /// and rebuild the index. On failure nothing is changed.
    pub async fn embed_nodes(&mut self) -> Result<usize> {
        let start = Instant::now();
        let (ids, texts): (Vec<NodeId>, Vec<String>) = self
            .store
            .active_nodes()
            .map(|node| (node.id.clone(), node.text()))
            .unzip();

        info!("Generating embeddings for {} active nodes", ids.len());
        let vectors = self.embeddings.embed_texts(&texts).await?;
        let index = EmbeddingIndex::build(ids.iter().cloned().zip(vectors).collect())?;

        self.store.clear_embeddings();
        for id in &ids {
            if let Some(vector) = index.vector(id) {
                self.store.set_embedding(id, vector.to_vec())?;
            }
        }
        self.index = Some(index);

        info!("Embedded {} nodes in {:?}", ids.len(), start.elapsed());
        Ok(ids.len())
    }

    async fn ensure_index(&mut self) -> Result<()> {
        if self.index.is_none() {
            self.embed_nodes().await?;
        }
        Ok(())
    }

    fn require_index(&self) -> Result<&EmbeddingIndex> {
        self.index.as_ref().ok_or_else(|| {
            ReasonGraphError::InvalidOperation("nodes have not been embedded yet".to_string())
        })
    }

    /// Structural similarity of the active children of `a` and `b`.
    pub fn children_similarity(&self, a: &str, b: &str) -> Result<f32> {
        children_similarity(&self.child_vectors(a), &self.child_vectors(b))
    }

    fn child_vectors(&self, id: &str) -> Vec<Option<&[f32]>> {
        let index = self.index.as_ref();
        self.store
            .active_children(id)
            .into_iter()
            .map(|child| index.and_then(|index| index.vector(&child.id)))
            .collect()
    }

    fn score_with_node_similarity(&self, a: &str, b: &str, node: f32) -> Result<PairScore> {
        let children = self.children_similarity(a, b)?;
        Ok(PairScore {
            node,
            children,
            combined: self.weights.combine(node, children),
        })
    }

    /// Score two indexed nodes.
    pub fn pair_score(&self, a: &str, b: &str) -> Result<PairScore> {
        let node = self.require_index()?.similarity(a, b)?;
        self.score_with_node_similarity(a, b, node)
    }

    /// Scan all active nodes for equivalent pairs.
    ///
    /// Each unordered pair is scored at most once. The judge is consulted
    /// only for pairs whose combined score reaches the threshold. Any
    /// embedding failure aborts the scan.
    pub async fn find_equivalent_pairs(&mut self) -> Result<Vec<EquivalentPair>> {
        info!("Starting equivalent node detection...");
        self.embed_nodes().await?;

        let index = self.require_index()?;
        let threshold = self.config.similarity_threshold;
        let active: Vec<NodeId> = self.store.active_nodes().map(|n| n.id.clone()).collect();
        let mut seen: HashSet<(NodeId, NodeId)> = HashSet::new();
        let mut pairs = Vec::new();

        for id in &active {
            for (candidate, node_similarity) in index.nearest_to(id, self.config.max_candidates)? {
                let key = if *id <= candidate {
                    (id.clone(), candidate.clone())
                } else {
                    (candidate.clone(), id.clone())
                };
                if !seen.insert(key) {
                    continue;
                }
                if !self.store.is_active(&candidate) {
                    continue;
                }

                let score = self.score_with_node_similarity(id, &candidate, node_similarity)?;
                debug!(
                    "Similarity between {} and {}: node={:.3}, children={:.3}, combined={:.3}",
                    id, candidate, score.node, score.children, score.combined
                );

                if score.combined >= threshold {
                    info!(
                        "High similarity detected, evaluating with {}: {} vs {}",
                        self.judge.judge_name(),
                        id,
                        candidate
                    );
                    if self.judge.judge(&self.store, id, &candidate).await {
                        pairs.push(EquivalentPair::new(id.clone(), candidate, score.combined));
                    }
                }
            }
        }

        info!("Found {} equivalent node pairs.", pairs.len());
        Ok(pairs)
    }

    /// Full check of one pair: threshold, then the judge. Unknown or pruned
    /// nodes are never equivalent.
    pub async fn are_nodes_equivalent(&mut self, a: &str, b: &str) -> Result<bool> {
        if !self.store.is_active(a) || !self.store.is_active(b) {
            return Ok(false);
        }
        self.ensure_index().await?;

        let index = self.require_index()?;
        if !index.contains(a) || !index.contains(b) {
            return Ok(false);
        }

        let score = self.pair_score(a, b)?;
        if score.combined >= self.config.similarity_threshold {
            return Ok(self.judge.judge(&self.store, a, b).await);
        }
        Ok(false)
    }

    /// Combined score of two nodes; `None` when either is unknown or was
    /// not embedded.
    pub async fn similarity_score(&mut self, a: &str, b: &str) -> Result<Option<PairScore>> {
        if !self.store.contains(a) || !self.store.contains(b) {
            return Ok(None);
        }
        self.ensure_index().await?;

        let index = self.require_index()?;
        if !index.contains(a) || !index.contains(b) {
            return Ok(None);
        }
        self.pair_score(a, b).map(Some)
    }

    /// Scores of the `top_k` nearest candidates of `id`, for tuning the
    /// threshold. Empty for unknown or pruned nodes.
    pub async fn analyze_candidates(
        &mut self,
        id: &str,
        top_k: usize,
    ) -> Result<Vec<CandidateAnalysis>> {
        if !self.store.is_active(id) {
            return Ok(Vec::new());
        }
        self.ensure_index().await?;

        let index = self.require_index()?;
        if !index.contains(id) {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for (candidate_id, node_similarity) in
            index.nearest_to(id, top_k.min(self.config.max_candidates))?
        {
            let Some(candidate) = self.store.get(&candidate_id).filter(|c| c.is_active()) else {
                continue;
            };
            let score = self.score_with_node_similarity(id, &candidate_id, node_similarity)?;
            results.push(CandidateAnalysis {
                candidate_summary: candidate.summary.clone(),
                node_type: candidate.node_type.clone(),
                depth: candidate.depth,
                candidate_id,
                node_similarity: score.node,
                children_similarity: score.children,
                combined_similarity: score.combined,
                above_threshold: score.combined >= self.config.similarity_threshold,
            });
        }
        Ok(results)
    }

    pub fn similarity_statistics(&self) -> SimilarityStatistics {
        let mut stats = SimilarityStatistics::default();
        for node in self.store.iter() {
            let entry = stats.by_node_type.entry(type_key(&node.node_type)).or_default();
            entry.total += 1;
            stats.total_nodes += 1;
            if node.is_active() {
                entry.active += 1;
                stats.active_nodes += 1;
            }
        }
        stats
    }
}

/// Statistics key for a node type.
pub(crate) fn type_key(node_type: &NodeType) -> String {
    match node_type {
        NodeType::Unknown => "unknown".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use reasongraph_ai::{FixedJudge, ScriptedJudge};
    use reasongraph_vector::InMemoryEmbeddingProvider;

    const GRAPH: &str = r#"{
        "q": {"summary": "Q", "content": "What is freedom?", "node_type": "question"},
        "a": {"summary": "A", "content": "", "node_type": "thesis", "parent_id": "q", "depth": 1},
        "b": {"summary": "B", "content": "", "node_type": "thesis", "parent_id": "q", "depth": 1},
        "c1": {"summary": "C1", "content": "", "node_type": "support", "parent_id": "b", "depth": 2},
        "c2": {"summary": "C2", "content": "", "node_type": "support", "parent_id": "b", "depth": 2},
        "gone": {"summary": "Gone", "content": "", "node_type": "thesis", "depth": 1, "identical_to": "a"}
    }"#;

    fn provider() -> InMemoryEmbeddingProvider {
        let side = (1.0f32 - 0.81).sqrt();
        InMemoryEmbeddingProvider::new(5)
            .with_vector("Q What is freedom?", vec![0.0, 0.0, 0.0, 0.0, 1.0])
            .with_vector("A", vec![1.0, 0.0, 0.0, 0.0, 0.0])
            .with_vector("B", vec![0.9, side, 0.0, 0.0, 0.0])
            .with_vector("C1", vec![0.0, 0.0, 1.0, 0.0, 0.0])
            .with_vector("C2", vec![0.0, 0.0, 0.0, 1.0, 0.0])
    }

    fn analyzer(judge: Arc<dyn SemanticJudge>) -> NodeAnalyzer {
        NodeAnalyzer::new(
            NodeStore::from_json_str(GRAPH).unwrap(),
            EmbeddingGenerator::new(Arc::new(provider())),
            judge,
            AnalysisConfig::default(),
        )
    }

    #[tokio::test]
    async fn embedding_skips_pruned_nodes_and_caches_unit_vectors() {
        let mut analyzer = analyzer(Arc::new(FixedJudge::reject_all()));
        assert_eq!(analyzer.embed_nodes().await.unwrap(), 5);
        assert!(analyzer.store().get("gone").unwrap().embedding.is_none());
        assert!(!analyzer.index().unwrap().contains("gone"));

        let b = analyzer.store().get("b").unwrap().embedding.clone().unwrap();
        let norm: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
    }

    #[tokio::test]
    async fn childless_versus_two_children_never_reaches_the_judge() {
        let judge = Arc::new(FixedJudge::accept_all());
        let mut analyzer = analyzer(judge.clone());
        let pairs = analyzer.find_equivalent_pairs().await.unwrap();
        assert!(pairs.is_empty());
        assert_eq!(judge.calls(), 0);

        let score = analyzer.similarity_score("a", "b").await.unwrap().unwrap();
        assert_relative_eq!(score.node, 0.9, epsilon = 1e-5);
        assert_eq!(score.children, 0.0);
        assert_relative_eq!(score.combined, 0.63, epsilon = 1e-5);
    }

    #[tokio::test]
    async fn unknown_and_pruned_nodes_are_never_equivalent() {
        let judge = Arc::new(FixedJudge::accept_all());
        let mut analyzer = analyzer(judge.clone());
        assert!(!analyzer.are_nodes_equivalent("a", "missing").await.unwrap());
        assert!(!analyzer.are_nodes_equivalent("a", "gone").await.unwrap());
        assert!(analyzer.similarity_score("a", "missing").await.unwrap().is_none());
        // Pruned nodes are known but never embedded
        assert!(analyzer.similarity_score("a", "gone").await.unwrap().is_none());
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn candidate_analysis_reports_each_component() {
        let mut analyzer = analyzer(Arc::new(ScriptedJudge::new()));
        let rows = analyzer.analyze_candidates("a", 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].candidate_id, "b");
        assert_eq!(rows[0].candidate_summary, "B");
        assert_eq!(rows[0].node_type, NodeType::Thesis);
        assert_eq!(rows[0].depth, 1);
        assert!(!rows[0].above_threshold);
        assert!(rows.iter().all(|row| row.candidate_id != "a"));

        assert!(analyzer.analyze_candidates("gone", 5).await.unwrap().is_empty());
        assert!(analyzer.analyze_candidates("nope", 5).await.unwrap().is_empty());
    }

    #[test]
    fn statistics_count_by_type() {
        let analyzer = analyzer(Arc::new(FixedJudge::reject_all()));
        let stats = analyzer.similarity_statistics();
        assert_eq!(stats.total_nodes, 6);
        assert_eq!(stats.active_nodes, 5);
        assert_eq!(stats.by_node_type["thesis"], TypeActivity { total: 3, active: 2 });
        assert_eq!(stats.by_node_type["support"], TypeActivity { total: 2, active: 2 });
    }

    #[tokio::test]
    async fn children_similarity_is_symmetric() {
        let mut analyzer = analyzer(Arc::new(FixedJudge::reject_all()));
        analyzer.embed_nodes().await.unwrap();
        let qb = analyzer.children_similarity("q", "b").unwrap();
        let bq = analyzer.children_similarity("b", "q").unwrap();
        assert_relative_eq!(qb, bq, epsilon = 1e-6);
        assert_eq!(analyzer.children_similarity("a", "c1").unwrap(), 1.0);
    }
}
