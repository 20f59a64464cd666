use approx::assert_relative_eq;
use reasongraph_ai::{FixedJudge, ScriptedJudge, SemanticJudge};
use reasongraph_core::{AnalysisConfig, NodeStore, Result};
use reasongraph_graph::{GraphPruner, NodeAnalyzer};
use reasongraph_vector::{EmbeddingGenerator, InMemoryEmbeddingProvider};
use std::sync::Arc;

const SIBLINGS: &str = r#"{
    "q": {"summary": "Q", "content": "What is knowledge?", "node_type": "question", "is_central_question": true},
    "t1": {"summary": "T1", "content": "", "node_type": "thesis", "parent_id": "q", "depth": 1},
    "t2": {"summary": "T2", "content": "", "node_type": "thesis", "parent_id": "q", "depth": 1},
    "s1": {"summary": "S1", "content": "", "node_type": "support", "parent_id": "t1", "depth": 2},
    "s2": {"summary": "S2", "content": "", "node_type": "support", "parent_id": "t2", "depth": 2}
}"#;

fn unit_pair(first: usize, second: usize, cos: f32, dim: usize) -> (Vec<f32>, Vec<f32>) {
    let mut a = vec![0.0; dim];
    let mut b = vec![0.0; dim];
    a[first] = 1.0;
    b[first] = cos;
    b[second] = (1.0 - cos * cos).sqrt();
    (a, b)
}

fn sibling_provider() -> InMemoryEmbeddingProvider {
    let (t1, t2) = unit_pair(0, 1, 0.95, 5);
    let (s1, s2) = unit_pair(2, 3, 0.92, 5);
    InMemoryEmbeddingProvider::new(5)
        .with_vector("Q What is knowledge?", vec![0.0, 0.0, 0.0, 0.0, 1.0])
        .with_vector("T1", t1)
        .with_vector("T2", t2)
        .with_vector("S1", s1)
        .with_vector("S2", s2)
}

fn pruner(
    json: &str,
    provider: InMemoryEmbeddingProvider,
    judge: Arc<dyn SemanticJudge>,
) -> GraphPruner {
    GraphPruner::new(NodeAnalyzer::new(
        NodeStore::from_json_str(json).unwrap(),
        EmbeddingGenerator::new(Arc::new(provider)),
        judge,
        AnalysisConfig::default(),
    ))
}

#[tokio::test]
async fn test_sibling_theses_with_matching_supports_are_merged() -> Result<()> {
    let judge = Arc::new(ScriptedJudge::new().with_pair("t1", "t2"));
    let mut pruner = pruner(SIBLINGS, sibling_provider(), judge.clone());

    let pairs = pruner.analyzer_mut().find_equivalent_pairs().await?;
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].first.as_str(), pairs[0].second.as_str()), ("t1", "t2"));
    // 2 / (0.7/0.95 + 0.3/0.92) exceeds 1 and is capped
    assert_eq!(pairs[0].similarity, 1.0);

    let score = pruner.analyzer().pair_score("t1", "t2")?;
    assert_relative_eq!(score.children, 0.92, epsilon = 1e-4);

    // Leaf supports also clear the threshold; the judge turns them down
    assert!(judge
        .asked()
        .contains(&("s1".to_string(), "s2".to_string())));

    assert_eq!(pruner.apply_equivalences(&pairs)?, 1);
    let store = pruner.store();
    assert_eq!(store.get("t2").unwrap().identical_to.as_deref(), Some("t1"));
    assert_eq!(store.get("t1").unwrap().children, vec!["s1", "s2"]);
    assert_eq!(store.get("s2").unwrap().parent_id.as_deref(), Some("t1"));
    assert_eq!(store.get("q").unwrap().children, vec!["t1"]);
    Ok(())
}

#[tokio::test]
async fn test_each_pair_is_judged_once_per_scan() -> Result<()> {
    let judge = Arc::new(ScriptedJudge::new());
    let mut pruner = pruner(SIBLINGS, sibling_provider(), judge.clone());
    pruner.prune_equivalent_nodes().await?;

    let mut asked: Vec<(String, String)> = judge
        .asked()
        .into_iter()
        .map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
        .collect();
    let total = asked.len();
    asked.sort();
    asked.dedup();
    assert_eq!(asked.len(), total);
    Ok(())
}

#[tokio::test]
async fn test_overlapping_pairs_leave_third_node_active() -> Result<()> {
    let json = r#"{
        "a": {"summary": "A", "content": "", "node_type": "thesis", "depth": 1},
        "b": {"summary": "B", "content": "", "node_type": "thesis", "depth": 1},
        "c": {"summary": "C", "content": "", "node_type": "thesis", "depth": 1}
    }"#;
    let provider = InMemoryEmbeddingProvider::new(2)
        .with_vector("A", vec![1.0, 0.0])
        .with_vector("B", vec![0.819152, 0.573576])
        .with_vector("C", vec![0.342020, 0.939693]);
    let judge = Arc::new(ScriptedJudge::new().with_pair("a", "b").with_pair("b", "c"));
    let mut pruner = pruner(json, provider, judge);

    // Every pair clears the threshold; the judge accepts only a-b and b-c,
    // and (b, c) comes after (a, b)
    let merged = pruner.prune_equivalent_nodes().await?;
    assert_eq!(merged, 1);
    assert!(pruner.store().is_active("a"));
    assert!(pruner.store().is_active("c"));
    assert!(!pruner.store().is_active("b"));
    Ok(())
}

#[tokio::test]
async fn test_embedding_failure_aborts_scan_without_side_effects() {
    let judge = Arc::new(FixedJudge::accept_all());
    let mut pruner = pruner(SIBLINGS, sibling_provider().failing(), judge.clone());
    let before = pruner.export_pruned_graph();

    assert!(pruner.prune_equivalent_nodes().await.is_err());
    assert_eq!(judge.calls(), 0);
    assert!(pruner.analyzer().index().is_none());
    assert!(pruner.store().iter().all(|n| n.embedding.is_none()));
    assert_eq!(pruner.export_pruned_graph(), before);
}

#[tokio::test]
async fn test_export_round_trips_through_json() -> Result<()> {
    let judge = Arc::new(ScriptedJudge::new().with_pair("t1", "t2"));
    let mut pruner = pruner(SIBLINGS, sibling_provider(), judge);
    pruner.prune_equivalent_nodes().await?;

    let json = pruner.export_pruned_graph().to_json_string_pretty()?;
    assert_eq!(json, pruner.export_pruned_graph().to_json_string_pretty()?);
    let positions: Vec<usize> = ["q", "t1", "t2", "s1", "s2"]
        .iter()
        .map(|k| json.find(&format!("\"{}\": {{", k)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(json.contains("\"identical_to\": \"t1\""));
    assert_eq!(json.matches("is_central_question").count(), 1);

    let reloaded = NodeStore::from_json_str(&json)?;
    assert_eq!(reloaded.export(), pruner.export_pruned_graph());
    Ok(())
}
