use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Opaque node identifier as it appears in the input snapshot.
pub type NodeId = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum NodeType {
    Question,
    Thesis,
    Support,
    #[default]
    Unknown,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Question => "question",
            NodeType::Thesis => "thesis",
            NodeType::Support => "support",
            NodeType::Unknown => "",
            NodeType::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Exact spelling only, so export reproduces the input verbatim
        match s {
            "question" => Ok(NodeType::Question),
            "thesis" => Ok(NodeType::Thesis),
            "support" => Ok(NodeType::Support),
            "" => Ok(NodeType::Unknown),
            _ => Ok(NodeType::Other(s.to_string())),
        }
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(raw.parse().unwrap_or_default())
    }
}
