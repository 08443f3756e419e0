//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Layered grid graph data model."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::topology::TopologyId;

/// Score at or above which a node is considered critical.
pub const CRITICAL_THRESHOLD: f64 = 0.7;
/// Score at or above which a node is considered in warning.
pub const WARNING_THRESHOLD: f64 = 0.3;

/// Device or role of a grid vertex.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Generator,
    Bus,
    Load,
    Transformer,
    Pmu,
    Plc,
    Router,
    Hmi,
}

impl NodeKind {
    /// Layer a device of this kind lives on.
    pub fn layer(&self) -> Layer {
        match self {
            NodeKind::Generator | NodeKind::Bus | NodeKind::Load | NodeKind::Transformer => {
                Layer::Physical
            }
            NodeKind::Pmu | NodeKind::Plc | NodeKind::Router | NodeKind::Hmi => Layer::Cyber,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Physical,
    Cyber,
}

/// Health classification of a node. `Offline` is never derived from a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Normal,
    Warning,
    Critical,
    Offline,
}

impl NodeStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= CRITICAL_THRESHOLD {
            NodeStatus::Critical
        } else if score >= WARNING_THRESHOLD {
            NodeStatus::Warning
        } else {
            NodeStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Normal => "normal",
            NodeStatus::Warning => "warning",
            NodeStatus::Critical => "critical",
            NodeStatus::Offline => "offline",
        }
    }
}

/// Normalised layout coordinate; carries no physical meaning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridNode {
    pub id: String,
    pub kind: NodeKind,
    pub layer: Layer,
    pub position: Position,
    pub status: NodeStatus,
    pub anomaly_score: f64,
    pub label: String,
}

impl GridNode {
    /// Build a node at rest; the layer follows from `kind`.
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        label: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            layer: kind.layer(),
            position,
            status: NodeStatus::Normal,
            anomaly_score: 0.0,
            label: label.into(),
        }
    }

    /// Set the anomaly score (clamped to `[0, 1]`) and derive the status from it.
    pub fn set_anomaly_score(&mut self, score: f64) {
        self.anomaly_score = score.clamp(0.0, 1.0);
        self.status = NodeStatus::from_score(self.anomaly_score);
    }

    pub fn reset(&mut self) {
        self.anomaly_score = 0.0;
        self.status = NodeStatus::Normal;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Physical,
    Cyber,
    /// Cross-layer dependency between a cyber device and a physical element.
    Coupling,
}

/// Unordered connection between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub weight: f64,
}

impl GridEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: EdgeKind,
        weight: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight,
        }
    }

    /// The endpoint opposite `id`, or `None` when the edge does not touch `id`.
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(&self.target)
        } else if self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Direct neighbours of `id` in edge-declaration order, without duplicates.
pub fn neighbors<'a>(edges: &'a [GridEdge], id: &str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter_map(|edge| edge.other_end(id))
        .filter(|other| *other != id && seen.insert(*other))
        .collect()
}

/// A fully materialised topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridGraph {
    pub topology: TopologyId,
    pub nodes: Vec<GridNode>,
    pub edges: Vec<GridEdge>,
}

impl GridGraph {
    pub fn node(&self, id: &str) -> Option<&GridNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        neighbors(&self.edges, id)
    }

    /// Check that node ids are unique and every edge endpoint resolves.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(SimError::Topology(format!("duplicate node id '{}'", node.id)));
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(SimError::Topology(format!(
                        "edge {}-{} references unknown node '{}'",
                        edge.source, edge.target, endpoint
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> GridNode {
        GridNode::new(id, NodeKind::Bus, id, Position::new(0.5, 0.5))
    }

    #[test]
    fn status_follows_score_thresholds() {
        assert_eq!(NodeStatus::from_score(0.0), NodeStatus::Normal);
        assert_eq!(NodeStatus::from_score(0.29), NodeStatus::Normal);
        assert_eq!(NodeStatus::from_score(0.3), NodeStatus::Warning);
        assert_eq!(NodeStatus::from_score(0.69), NodeStatus::Warning);
        assert_eq!(NodeStatus::from_score(0.7), NodeStatus::Critical);
        assert_eq!(NodeStatus::from_score(1.0), NodeStatus::Critical);
    }

    #[test]
    fn set_anomaly_score_clamps_and_derives() {
        let mut bus = node("bus1");
        bus.set_anomaly_score(1.7);
        assert_eq!(bus.anomaly_score, 1.0);
        assert_eq!(bus.status, NodeStatus::Critical);
        bus.set_anomaly_score(0.4);
        assert_eq!(bus.status, NodeStatus::Warning);
        bus.reset();
        assert_eq!(bus.status, NodeStatus::Normal);
        assert_eq!(bus.anomaly_score, 0.0);
    }

    #[test]
    fn neighbors_are_undirected_ordered_and_unique() {
        let edges = vec![
            GridEdge::new("a", "b", EdgeKind::Physical, 1.0),
            GridEdge::new("c", "a", EdgeKind::Cyber, 1.0),
            GridEdge::new("a", "b", EdgeKind::Coupling, 0.5),
            GridEdge::new("b", "c", EdgeKind::Physical, 1.0),
        ];
        assert_eq!(neighbors(&edges, "a"), vec!["b", "c"]);
        assert_eq!(neighbors(&edges, "c"), vec!["a", "b"]);
        assert!(neighbors(&edges, "z").is_empty());
    }

    #[test]
    fn validate_rejects_dangling_edges() {
        let graph = GridGraph {
            topology: TopologyId::Ieee14,
            nodes: vec![node("a")],
            edges: vec![GridEdge::new("a", "ghost", EdgeKind::Physical, 1.0)],
        };
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, SimError::Topology(message) if message.contains("ghost")));
    }

    #[test]
    fn layer_follows_kind() {
        assert_eq!(NodeKind::Generator.layer(), Layer::Physical);
        assert_eq!(NodeKind::Hmi.layer(), Layer::Cyber);
        let pmu = GridNode::new("pmu1", NodeKind::Pmu, "PMU 1", Position::new(2.0, -1.0));
        assert_eq!(pmu.layer, Layer::Cyber);
        assert_eq!(pmu.position, Position { x: 1.0, y: 0.0 });
    }
}
