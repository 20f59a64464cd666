use crate::{NodeId, NodeType};
use serde::{Deserialize, Deserializer, Serialize};

/// A statement in the reasoning graph together with its derived child index.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub summary: String,
    pub content: String,
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    pub depth: u32,
    pub terminal: bool,
    pub nonsense: bool,
    pub identical_to: Option<NodeId>,
    pub is_central_question: bool,
    /// Derived from the `parent_id` of other nodes; maintained by merges.
    pub children: Vec<NodeId>,
    pub embedding: Option<Vec<f32>>,
}

impl GraphNode {
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            summary: String::new(),
            content: String::new(),
            node_type,
            parent_id: None,
            depth: 0,
            terminal: false,
            nonsense: false,
            identical_to: None,
            is_central_question: false,
            children: Vec::new(),
            embedding: None,
        }
    }

    pub fn from_record(id: impl Into<NodeId>, record: NodeRecord) -> Self {
        Self {
            id: id.into(),
            summary: record.summary,
            content: record.content,
            node_type: record.node_type,
            parent_id: record.parent_id,
            depth: record.depth,
            terminal: record.terminal,
            nonsense: record.nonsense,
            identical_to: record.identical_to,
            is_central_question: record.is_central_question,
            children: Vec::new(),
            embedding: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// A node is active until it has been merged into another one.
    pub fn is_active(&self) -> bool {
        self.identical_to.is_none()
    }

    pub fn is_pruned(&self) -> bool {
        self.identical_to.is_some()
    }

    /// Text sent to the embedding service.
    pub fn text(&self) -> String {
        format!("{} {}", self.summary, self.content).trim().to_string()
    }

    pub fn to_record(&self) -> NodeRecord {
        NodeRecord {
            summary: self.summary.clone(),
            content: self.content.clone(),
            node_type: self.node_type.clone(),
            parent_id: self.parent_id.clone(),
            depth: self.depth,
            terminal: self.terminal,
            nonsense: self.nonsense,
            identical_to: self.identical_to.clone(),
            is_central_question: self.is_central_question,
        }
    }
}

/// Flat, serializable form of a node used for input snapshots and export.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub depth: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub terminal: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nonsense: bool,
    #[serde(default)]
    pub identical_to: Option<NodeId>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_central_question: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
