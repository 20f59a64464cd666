use crate::analyzer::{type_key, EquivalentPair, NodeAnalyzer};
use reasongraph_core::{GraphSnapshot, NodeStore, ReasonGraphError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypePruning {
    pub total: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruningStatistics {
    pub total_nodes: usize,
    pub pruned_nodes: usize,
    pub active_nodes: usize,
    pub pruning_ratio: f64,
    pub by_node_type: BTreeMap<String, TypePruning>,
}

/// Collapses equivalent nodes by merging one into the other.
///
/// Merging is greedy and follows the order pairs are applied in. There is no
/// transitive closure: after A absorbs B, a pair (B, C) is dropped rather
/// than turned into (A, C).
pub struct GraphPruner {
    analyzer: NodeAnalyzer,
}

impl GraphPruner {
    pub fn new(analyzer: NodeAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn analyzer(&self) -> &NodeAnalyzer {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut NodeAnalyzer {
        &mut self.analyzer
    }

    pub fn store(&self) -> &NodeStore {
        self.analyzer.store()
    }

    pub fn into_analyzer(self) -> NodeAnalyzer {
        self.analyzer
    }

    /// Merge `source` into `target`.
    ///
    /// `source` is marked identical to `target`, its children move under
    /// `target`, and `target` takes its place in the parent's child list.
    /// Every check happens before the first write, so on error the graph is
    /// unchanged.
    pub fn merge_nodes(&mut self, target: &str, source: &str) -> Result<()> {
        let store = self.analyzer.store_mut();
        let target_node = store.require(target)?;
        let source_node = store.require(source)?;

        if target == source {
            return Err(ReasonGraphError::InvalidOperation(format!(
                "cannot merge node {} into itself",
                source
            )));
        }
        if let Some(pruned) = [target_node, source_node].iter().find(|n| n.is_pruned()) {
            return Err(ReasonGraphError::InvalidOperation(format!(
                "node {} is already merged into {}",
                pruned.id,
                pruned.identical_to.as_deref().unwrap_or_default()
            )));
        }
        if store.is_ancestor(source, target) || store.reaches_through_children(source, target) {
            return Err(ReasonGraphError::CycleRejected(format!(
                "cannot merge {} into its descendant {}",
                source, target
            )));
        }

        let source_children = source_node.children.clone();
        let source_parent = source_node.parent_id.clone();
        let target_parent = target_node.parent_id.clone();
        // Listing target under a node inside its own subtree would close a loop
        let relink_parent = source_parent.as_deref().filter(|parent| {
            *parent != target
                && !store.is_ancestor(target, parent)
                && !store.reaches_through_children(target, parent)
        });
        let relink_parent = relink_parent.map(str::to_string);

        if let Some(node) = store.get_mut(source) {
            node.identical_to = Some(target.to_string());
            node.children.clear();
        }

        let mut moved = Vec::new();
        if let Some(node) = store.get_mut(target) {
            for child in source_children {
                if !node.children.contains(&child) {
                    node.children.push(child.clone());
                    moved.push(child);
                }
            }
        }
        for child in &moved {
            if let Some(node) = store.get_mut(child) {
                node.parent_id = Some(target.to_string());
            }
        }

        if let Some(parent_id) = source_parent.as_deref() {
            if let Some(parent) = store.get_mut(parent_id) {
                if let Some(position) = parent.children.iter().position(|c| c == source) {
                    parent.children.remove(position);
                    let relink = relink_parent.as_deref() == Some(parent_id);
                    if relink && !parent.children.iter().any(|c| c == target) {
                        parent.children.push(target.to_string());
                        if target_parent.is_none() {
                            if let Some(node) = store.get_mut(target) {
                                node.parent_id = Some(parent_id.to_string());
                            }
                        }
                    }
                }
            }
        }

        info!(
            "Merged {} into {} ({} children moved)",
            source,
            target,
            moved.len()
        );
        Ok(())
    }

    /// Apply pairs in order. The shallower node survives; on equal depth the
    /// first node of the pair does. Pairs touching a node that is no longer
    /// active are skipped, as are pairs whose survivor sits below the other
    /// node. Any other merge error is returned.
    pub fn apply_equivalences(&mut self, pairs: &[EquivalentPair]) -> Result<usize> {
        let mut merged = 0;
        for pair in pairs {
            let store = self.analyzer.store();
            let (Some(first), Some(second)) = (store.get(&pair.first), store.get(&pair.second))
            else {
                debug!("Skipping pair {} / {}: unknown node", pair.first, pair.second);
                continue;
            };
            if first.is_pruned() || second.is_pruned() {
                debug!(
                    "Skipping pair {} / {}: already merged",
                    pair.first, pair.second
                );
                continue;
            }

            let (target, source) = if first.depth <= second.depth {
                (pair.first.clone(), pair.second.clone())
            } else {
                (pair.second.clone(), pair.first.clone())
            };

            match self.merge_nodes(&target, &source) {
                Ok(()) => merged += 1,
                Err(ReasonGraphError::CycleRejected(reason)) => {
                    warn!("Skipping pair {} / {}: {}", pair.first, pair.second, reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(merged)
    }

    /// Scan for equivalent pairs and merge them. Returns the number of merges.
    pub async fn prune_equivalent_nodes(&mut self) -> Result<usize> {
        let pairs = self.analyzer.find_equivalent_pairs().await?;
        let merged = self.apply_equivalences(&pairs)?;
        info!("Pruned {} nodes from {} equivalent pairs", merged, pairs.len());
        Ok(merged)
    }

    /// Flat snapshot of the graph, pruned nodes included.
    pub fn export_pruned_graph(&self) -> GraphSnapshot {
        self.analyzer.store().export()
    }

    pub fn pruning_statistics(&self) -> PruningStatistics {
        let mut stats = PruningStatistics::default();
        for node in self.analyzer.store().iter() {
            let entry = stats.by_node_type.entry(type_key(&node.node_type)).or_default();
            entry.total += 1;
            stats.total_nodes += 1;
            if node.is_pruned() {
                entry.pruned += 1;
                stats.pruned_nodes += 1;
            }
        }
        stats.active_nodes = stats.total_nodes - stats.pruned_nodes;
        stats.pruning_ratio = if stats.total_nodes == 0 {
            0.0
        } else {
            stats.pruned_nodes as f64 / stats.total_nodes as f64
        };
        stats
    }
}
