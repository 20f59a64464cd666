use crate::{GraphNode, NodeId, NodeRecord, ReasonGraphError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered mapping from node identifier to node record.
///
/// This is the only persistence format: it is what gets loaded and what gets
/// exported. Entry order follows the source document.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    entries: Vec<(NodeId, NodeRecord)>,
    positions: HashMap<NodeId, usize>,
}

impl PartialEq for GraphSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. Replacing keeps the original position.
    pub fn insert(&mut self, id: impl Into<NodeId>, record: NodeRecord) {
        let id = id.into();
        match self.positions.get(&id) {
            Some(&slot) => self.entries[slot].1 = record,
            None => {
                self.positions.insert(id.clone(), self.entries.len());
                self.entries.push((id, record));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.positions.get(id).map(|&slot| &self.entries[slot].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeRecord)> {
        self.entries.iter().map(|(id, record)| (id, record))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl IntoIterator for GraphSnapshot {
    type Item = (NodeId, NodeRecord);
    type IntoIter = std::vec::IntoIter<(NodeId, NodeRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(NodeId, NodeRecord)> for GraphSnapshot {
    fn from_iter<I: IntoIterator<Item = (NodeId, NodeRecord)>>(iter: I) -> Self {
        let mut snapshot = GraphSnapshot::new();
        for (id, record) in iter {
            snapshot.insert(id, record);
        }
        snapshot
    }
}

impl Serialize for GraphSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, record) in &self.entries {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for GraphSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = GraphSnapshot;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map from node identifier to node record")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut snapshot = GraphSnapshot::new();
                while let Some((id, record)) = access.next_entry::<NodeId, NodeRecord>()? {
                    snapshot.insert(id, record);
                }
                Ok(snapshot)
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}

/// Owned arena of graph nodes keyed by identifier, iterated in insertion order.
///
/// Readers borrow the store immutably; structural edits go through `get_mut`,
/// which only the pruner uses.
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    nodes: Vec<GraphNode>,
    index: HashMap<NodeId, usize>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the store in two passes: create every node, then link children
    /// from each node's `parent_id`.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        Self::from_nodes(
            snapshot
                .into_iter()
                .map(|(id, record)| GraphNode::from_record(id, record)),
        )
    }

    /// Build the store from prepared nodes. Any `children` on the input nodes
    /// are discarded and rebuilt from `parent_id`.
    pub fn from_nodes<I: IntoIterator<Item = GraphNode>>(nodes: I) -> Self {
        let mut store = NodeStore::new();
        for mut node in nodes {
            node.children.clear();
            match store.index.get(&node.id) {
                Some(&slot) => {
                    warn!("Duplicate node id {} in snapshot; keeping the last record", node.id);
                    store.nodes[slot] = node;
                }
                None => {
                    store.index.insert(node.id.clone(), store.nodes.len());
                    store.nodes.push(node);
                }
            }
        }
        store.link_children();
        store
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::from_snapshot(GraphSnapshot::from_json_str(json)?))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    fn link_children(&mut self) {
        let links: Vec<(usize, NodeId)> = self
            .nodes
            .iter()
            .filter_map(|node| {
                let parent = node.parent_id.as_ref()?;
                if *parent == node.id {
                    warn!("Node {} names itself as parent; not linking", node.id);
                    return None;
                }
                match self.index.get(parent) {
                    Some(&slot) => Some((slot, node.id.clone())),
                    None => {
                        debug!("Parent {} of node {} is not in the graph", parent, node.id);
                        None
                    }
                }
            })
            .collect();

        for (parent_slot, child_id) in links {
            self.nodes[parent_slot].children.push(child_id);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        match self.index.get(id) {
            Some(&slot) => Some(&mut self.nodes[slot]),
            None => None,
        }
    }

    /// Like `get`, but an unknown identifier is an error.
    pub fn require(&self, id: &str) -> Result<&GraphNode> {
        self.get(id)
            .ok_or_else(|| ReasonGraphError::NodeNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|node| &node.id)
    }

    pub fn active_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|node| node.is_active())
    }

    /// Unknown identifiers are never active.
    pub fn is_active(&self, id: &str) -> bool {
        self.get(id).map(GraphNode::is_active).unwrap_or(false)
    }

    /// Children of `id` that exist in the store and have not been pruned,
    /// in child-list order.
    pub fn active_children(&self, id: &str) -> Vec<&GraphNode> {
        match self.get(id) {
            Some(node) => node
                .children
                .iter()
                .filter_map(|child| self.get(child))
                .filter(|child| child.is_active())
                .collect(),
            None => Vec::new(),
        }
    }

    /// True when `ancestor` appears on the parent chain of `id`.
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.get(id).and_then(|node| node.parent_id.as_deref());
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            if !visited.insert(parent) {
                return false;
            }
            current = self.get(parent).and_then(|node| node.parent_id.as_deref());
        }
        false
    }

    /// True when `to` can be reached from `from` by following child lists.
    ///
    /// After a merge relinks a target that keeps its own parent, child lists
    /// and `parent_id` no longer describe the same tree, so cycle checks need
    /// both this and `is_ancestor`.
    pub fn reaches_through_children(&self, from: &str, to: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = match self.get(from) {
            Some(node) => node.children.iter().map(String::as_str).collect(),
            None => return false,
        };
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.get(id) {
                stack.extend(node.children.iter().map(String::as_str));
            }
        }
        false
    }

    pub fn set_embedding(&mut self, id: &str, embedding: Vec<f32>) -> Result<()> {
        let node = self
            .get_mut(id)
            .ok_or_else(|| ReasonGraphError::NodeNotFound(id.to_string()))?;
        node.embedding = Some(embedding);
        Ok(())
    }

    pub fn clear_embeddings(&mut self) {
        for node in &mut self.nodes {
            node.embedding = None;
        }
    }

    /// Snapshot of every node, pruned ones included.
    pub fn export(&self) -> GraphSnapshot {
        self.nodes
            .iter()
            .map(|node| (node.id.clone(), node.to_record()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeType;

    const SAMPLE: &str = r#"{
        "root": {"summary": "What is freedom?", "content": "What is freedom?", "node_type": "question", "is_central_question": true},
        "t1": {"summary": "Non-interference", "content": "{Freedom is absence of interference}", "node_type": "thesis", "parent_id": "root", "depth": 1},
        "t2": {"summary": "Autonomy", "content": "{Freedom is self-governance}", "node_type": "thesis", "parent_id": "root", "depth": 1},
        "s1": {"summary": "Choice", "content": "{Choice needs no coercion}", "node_type": "support", "parent_id": "t1", "depth": 2, "terminal": true},
        "orphan": {"summary": "Lost", "content": "", "node_type": "support", "parent_id": "missing"}
    }"#;

    #[test]
    fn load_links_children_in_document_order() {
        let store = NodeStore::from_json_str(SAMPLE).unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.get("root").unwrap().children, vec!["t1", "t2"]);
        assert_eq!(store.get("t1").unwrap().children, vec!["s1"]);
        assert!(store.get("orphan").unwrap().children.is_empty());
        let ids: Vec<&NodeId> = store.ids().collect();
        assert_eq!(ids, vec!["root", "t1", "t2", "s1", "orphan"]);
    }

    #[test]
    fn export_preserves_order_and_is_idempotent() {
        let store = NodeStore::from_json_str(SAMPLE).unwrap();
        let first = store.export();
        let second = store.export();
        assert_eq!(first, second);
        assert_eq!(
            first.to_json_string_pretty().unwrap(),
            second.to_json_string_pretty().unwrap()
        );
        let ids: Vec<&NodeId> = first.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["root", "t1", "t2", "s1", "orphan"]);
        assert!(first.get("root").unwrap().is_central_question);
    }

    #[test]
    fn active_children_skip_pruned_nodes() {
        let mut store = NodeStore::from_json_str(SAMPLE).unwrap();
        store.get_mut("t2").unwrap().identical_to = Some("t1".to_string());
        let active: Vec<&str> = store
            .active_children("root")
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(active, vec!["t1"]);
        assert!(!store.is_active("t2"));
        assert!(!store.is_active("nope"));
    }

    #[test]
    fn ancestry_walks_parent_chain() {
        let store = NodeStore::from_json_str(SAMPLE).unwrap();
        assert!(store.is_ancestor("root", "s1"));
        assert!(store.is_ancestor("t1", "s1"));
        assert!(!store.is_ancestor("t2", "s1"));
        assert!(!store.is_ancestor("s1", "root"));
    }

    #[test]
    fn child_reachability_follows_child_lists() {
        let mut store = NodeStore::from_json_str(SAMPLE).unwrap();
        assert!(store.reaches_through_children("root", "s1"));
        assert!(!store.reaches_through_children("s1", "root"));
        assert!(!store.reaches_through_children("ghost", "root"));

        // A second listing that parent_id does not record
        store.get_mut("t2").unwrap().children.push("t1".to_string());
        assert!(store.reaches_through_children("t2", "s1"));
        assert!(!store.is_ancestor("t2", "s1"));
    }

    #[test]
    fn duplicate_snapshot_keys_replace_in_place() {
        let mut snapshot = GraphSnapshot::from_json_str(SAMPLE).unwrap();
        let mut record = snapshot.get("t1").unwrap().clone();
        record.summary = "Replaced".to_string();
        snapshot.insert("t1", record);
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.get("t1").unwrap().summary, "Replaced");
        let ids: Vec<&NodeId> = snapshot.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["root", "t1", "t2", "s1", "orphan"]);
        assert!(snapshot.get("missing").is_none());
    }

    #[test]
    fn self_parent_is_not_linked() {
        let node = GraphNode::new("loop", NodeType::Thesis).with_parent("loop");
        let store = NodeStore::from_nodes(vec![node]);
        assert!(store.get("loop").unwrap().children.is_empty());
    }

    #[test]
    fn require_reports_unknown_ids() {
        let store = NodeStore::new();
        assert!(matches!(
            store.require("ghost"),
            Err(ReasonGraphError::NodeNotFound(id)) if id == "ghost"
        ));
    }
}
