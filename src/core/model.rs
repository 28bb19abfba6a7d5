//! GraphSnapshot model shared by every subsystem.
//!
//! The JSON shape is the one persisted by older clients (camelCase meta, `type` tags,
//! arbitrary extra fields). Unknown fields are carried through untouched so a
//! read-modify-write cycle never loses data written by a newer client.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const ARCHECORE_ID: &str = "archecore";
pub const DEFAULT_SPACE_NAME: &str = "New Space";

/// Deterministic id of a Space's core node.
pub fn core_id_for(space_id: &str) -> String {
    format!("core-{}", space_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Core,
    Cluster,
    Node,
    Other(String),
}

impl From<String> for NodeType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "core" => Self::Core,
            "cluster" => Self::Cluster,
            "node" => Self::Node,
            _ => Self::Other(value),
        }
    }
}

impl From<NodeType> for String {
    fn from(value: NodeType) -> Self {
        match value {
            NodeType::Core => "core".to_string(),
            NodeType::Cluster => "cluster".to_string(),
            NodeType::Node => "node".to_string(),
            NodeType::Other(tag) => tag,
        }
    }
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Node
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    /// Weak back-reference to a cluster in the same Space. Unchecked: may dangle,
    /// may name a non-cluster, may form a cycle.
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub parent_cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_folded: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub focus_hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub focus_ghost: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub focus_ghost_level: u8,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl NodeMeta {
    /// Same meta detached from any cluster and with every visibility flag cleared.
    pub fn released(&self) -> Self {
        Self {
            parent_cluster_id: None,
            is_hidden: false,
            focus_hidden: false,
            focus_ghost: false,
            focus_ghost_level: 0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub style: Map<String, JsonValue>,
    #[serde(default)]
    pub meta: NodeMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            node_type,
            position: Position { x, y },
            data: NodeData::default(),
            style: Map::new(),
            meta: NodeMeta::default(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data.label = Some(label.into());
        self
    }

    pub fn with_parent(mut self, cluster_id: impl Into<String>) -> Self {
        self.meta.parent_cluster_id = Some(cluster_id.into());
        self
    }

    pub fn is_core(&self) -> bool {
        self.node_type == NodeType::Core
    }

    pub fn is_cluster(&self) -> bool {
        self.node_type == NodeType::Cluster
    }

    pub fn parent_cluster_id(&self) -> Option<&str> {
        self.meta.parent_cluster_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            edge_type: None,
        }
    }
}

/// The persisted graph of one Space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceData {
    #[serde(rename = "spaceId", default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub version: u64,
}

impl SpaceData {
    pub fn empty(space_id: &str) -> Self {
        Self {
            space_id: Some(space_id.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Drop edges whose source or target is no longer a node of this graph.
    pub fn prune_dangling_edges(&mut self) -> usize {
        let ids: std::collections::HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let before = self.edges.len();
        self.edges
            .retain(|edge| ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str()));
        before - self.edges.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceKind {
    #[default]
    User,
    #[serde(alias = "sandbox")]
    Playground,
}

/// Registry entry for one Space. Metadata only; the graph lives in its own slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceMeta {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub last_accessed_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_node_id: Option<String>,
    #[serde(default)]
    pub grid_snap_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_space_id: Option<String>,
    #[serde(default)]
    pub kind: SpaceKind,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default)]
    pub deleted_at: Option<u64>,
}

impl SpaceMeta {
    pub fn core_id(&self) -> String {
        self.core_node_id
            .clone()
            .unwrap_or_else(|| core_id_for(&self.id))
    }
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    })
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u8) -> bool {
    *value == 0
}
