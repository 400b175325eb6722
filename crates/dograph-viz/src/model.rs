//! Node/edge model shared by the mapper and the renderer.
//!
//! A [`GraphBuilder`] is the per-render accumulator: it owns the node registry
//! (deduplicated by identity key, first-seen wins) and the edge list (never
//! deduplicated). [`GraphBuilder::finish`] hands back a [`VizGraph`] that the
//! renderer serializes into the HTML template.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

pub const EDGE_COLOR: &str = "#666666";
const SOURCE_COLOR: &str = "#97c2fc";
const TARGET_COLOR: &str = "#fc9797";

/// Field holding an entity's identity inside a nested record value.
pub const ENTITY_NAME_FIELD: &str = "name";
const FALLBACK_ENTITY_LABEL: &str = "Node";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    Box,
    Diamond,
}

/// Visual role of a node. Lets a viewer tell endpoints apart without reading labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Primary entity / edge source (also the plain default style).
    Source,
    /// Edge target in the simple-pair layout.
    Target,
    /// Secondary key attached to a primary entity.
    Related,
}

impl NodeRole {
    pub fn color(self) -> &'static str {
        match self {
            Self::Source => SOURCE_COLOR,
            Self::Target | Self::Related => TARGET_COLOR,
        }
    }

    pub fn shape(self) -> NodeShape {
        match self {
            Self::Source | Self::Target => NodeShape::Box,
            Self::Related => NodeShape::Diamond,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizNode {
    pub id: String,
    /// Display label; may span several lines.
    pub label: String,
    pub role: NodeRole,
    pub color: String,
    pub shape: NodeShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VizEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VizGraph {
    pub nodes: Vec<VizNode>,
    pub edges: Vec<VizEdge>,
}

impl VizGraph {
    pub fn node(&self, id: &str) -> Option<&VizNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<VizNode>,
    seen: HashSet<String>,
    edges: Vec<VizEdge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node unless its identity is already known.
    ///
    /// Returns `true` when the node was inserted. The label defaults to the id.
    pub fn add_node(&mut self, id: &str, label: Option<String>, role: NodeRole) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.nodes.push(VizNode {
            id: id.to_string(),
            label: label.unwrap_or_else(|| id.to_string()),
            role,
            color: role.color().to_string(),
            shape: role.shape(),
        });
        true
    }

    pub fn add_edge(&mut self, source: &str, target: &str, label: Option<String>) {
        self.edges.push(VizEdge {
            source: source.to_string(),
            target: target.to_string(),
            label: label.filter(|l| !l.is_empty()),
            color: EDGE_COLOR.to_string(),
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn finish(self) -> VizGraph {
        VizGraph {
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

/// Stable text form of a record value.
///
/// Strings are taken verbatim, numbers and booleans use their JSON text,
/// `null`/missing become the empty string, arrays and objects are compact JSON.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Identity key of a nested entity: its `name`, or a fresh random id.
pub fn entity_identity(entity: &Map<String, Value>) -> String {
    let name = value_text(entity.get(ENTITY_NAME_FIELD));
    if name.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        name
    }
}

/// `name` followed by one `key: value` line per other attribute.
pub fn attribute_label(entity: &Map<String, Value>) -> String {
    let mut name = value_text(entity.get(ENTITY_NAME_FIELD));
    if name.is_empty() {
        name = FALLBACK_ENTITY_LABEL.to_string();
    }
    let attrs = entity
        .iter()
        .filter(|(k, _)| k.as_str() != ENTITY_NAME_FIELD)
        .map(|(k, v)| format!("{k}: {}", value_text(Some(v))))
        .collect::<Vec<_>>();
    if attrs.is_empty() {
        name
    } else {
        format!("{name}\n{}", attrs.join("\n"))
    }
}
