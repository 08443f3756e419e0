//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Fixed IEEE-like bus topologies for the attack lab."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
//! Deterministic grid topologies.
//!
//! `ieee14` is declared by hand so that scenarios can rely on stable ids and
//! neighbourhoods. The two larger presets are generated from a parametric
//! layout: a bus ring with chords, generators, transformers and loads hung off
//! the ring, and a cyber layer of PMUs, PLCs, routers and HMIs coupled to it.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;
use crate::graph::{EdgeKind, GridEdge, GridGraph, GridNode, NodeKind, Position};

/// Closed set of supported topology presets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopologyId {
    #[default]
    Ieee14,
    Ieee30,
    Ieee57,
}

impl TopologyId {
    pub const ALL: [TopologyId; 3] = [TopologyId::Ieee14, TopologyId::Ieee30, TopologyId::Ieee57];

    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyId::Ieee14 => "ieee14",
            TopologyId::Ieee30 => "ieee30",
            TopologyId::Ieee57 => "ieee57",
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            TopologyId::Ieee14 => 14,
            TopologyId::Ieee30 => 30,
            TopologyId::Ieee57 => 57,
        }
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopologyId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalised.as_str() {
            "ieee14" | "14" => Ok(TopologyId::Ieee14),
            "ieee30" | "30" => Ok(TopologyId::Ieee30),
            "ieee57" | "57" => Ok(TopologyId::Ieee57),
            _ => Err(SimError::InvalidTopology(s.to_owned())),
        }
    }
}

/// Materialise the node and edge set for a preset. Same id, same graph.
pub fn build_topology(id: TopologyId) -> GridGraph {
    let builder = match id {
        TopologyId::Ieee14 => ieee14(),
        TopologyId::Ieee30 => RingLayout {
            buses: 12,
            generators: 4,
            transformers: 2,
            loads: 5,
            pmus: 3,
            plcs: 2,
            routers: 1,
            hmis: 1,
        }
        .build(),
        TopologyId::Ieee57 => RingLayout {
            buses: 24,
            generators: 6,
            transformers: 4,
            loads: 10,
            pmus: 6,
            plcs: 4,
            routers: 2,
            hmis: 1,
        }
        .build(),
    };
    GridGraph {
        topology: id,
        nodes: builder.nodes,
        edges: builder.edges,
    }
}

#[derive(Default)]
struct TopologyBuilder {
    nodes: Vec<GridNode>,
    edges: Vec<GridEdge>,
}

impl TopologyBuilder {
    fn node(&mut self, id: &str, kind: NodeKind, label: &str, x: f64, y: f64) {
        self.nodes
            .push(GridNode::new(id, kind, label, Position::new(x, y)));
    }

    fn link(&mut self, source: &str, target: &str, kind: EdgeKind) {
        let weight = match kind {
            EdgeKind::Physical => 1.0,
            EdgeKind::Cyber => 0.5,
            EdgeKind::Coupling => 0.3,
        };
        self.edges.push(GridEdge::new(source, target, kind, weight));
    }
}

fn ieee14() -> TopologyBuilder {
    use EdgeKind::{Coupling, Cyber, Physical};
    use NodeKind::*;

    let mut b = TopologyBuilder::default();
    b.node("gen1", Generator, "Generator G1", 0.10, 0.55);
    b.node("gen2", Generator, "Generator G2", 0.10, 0.85);
    b.node("bus1", Bus, "Bus 1", 0.28, 0.55);
    b.node("bus2", Bus, "Bus 2", 0.28, 0.85);
    b.node("bus3", Bus, "Bus 3", 0.48, 0.92);
    b.node("bus4", Bus, "Bus 4", 0.52, 0.72);
    b.node("bus5", Bus, "Bus 5", 0.48, 0.52);
    b.node("xfmr1", Transformer, "Transformer T1", 0.66, 0.52);
    b.node("bus6", Bus, "Bus 6", 0.80, 0.60);
    b.node("load1", Load, "Load L1", 0.92, 0.78);
    b.node("pmu1", Pmu, "PMU 1", 0.80, 0.28);
    b.node("plc1", Plc, "PLC 1", 0.40, 0.28);
    b.node("router1", Router, "Substation Router", 0.60, 0.12);
    b.node("hmi1", Hmi, "Control HMI", 0.88, 0.08);

    b.link("gen1", "bus1", Physical);
    b.link("gen2", "bus2", Physical);
    b.link("bus1", "bus2", Physical);
    b.link("bus1", "bus5", Physical);
    b.link("bus2", "bus3", Physical);
    b.link("bus2", "bus4", Physical);
    b.link("bus3", "bus4", Physical);
    b.link("bus4", "bus5", Physical);
    b.link("bus5", "xfmr1", Physical);
    b.link("xfmr1", "bus6", Physical);
    b.link("bus6", "load1", Physical);

    b.link("pmu1", "router1", Cyber);
    b.link("plc1", "router1", Cyber);
    b.link("router1", "hmi1", Cyber);

    b.link("pmu1", "bus6", Coupling);
    b.link("plc1", "bus4", Coupling);
    b.link("plc1", "gen2", Coupling);
    b
}

/// Parametric layout used for the larger presets.
struct RingLayout {
    buses: usize,
    generators: usize,
    transformers: usize,
    loads: usize,
    pmus: usize,
    plcs: usize,
    routers: usize,
    hmis: usize,
}

const RING_CENTER: (f64, f64) = (0.5, 0.68);
const RING_RADIUS: (f64, f64) = (0.32, 0.22);

impl RingLayout {
    fn build(&self) -> TopologyBuilder {
        let mut b = TopologyBuilder::default();

        for i in 1..=self.buses {
            let (x, y) = self.ring_point(i, 1.0);
            b.node(&format!("bus{i}"), NodeKind::Bus, &format!("Bus {i}"), x, y);
        }
        for i in 1..self.buses {
            b.link(&format!("bus{i}"), &format!("bus{}", i + 1), EdgeKind::Physical);
        }
        b.link(&format!("bus{}", self.buses), "bus1", EdgeKind::Physical);
        for i in (1..=self.buses.saturating_sub(3)).step_by(4) {
            b.link(&format!("bus{i}"), &format!("bus{}", i + 3), EdgeKind::Physical);
        }

        self.attach(&mut b, "gen", NodeKind::Generator, "Generator G", self.generators, 0, 1.35);
        self.attach(
            &mut b,
            "xfmr",
            NodeKind::Transformer,
            "Transformer T",
            self.transformers,
            self.buses / (2 * self.transformers.max(1)),
            1.22,
        );
        self.attach(&mut b, "load", NodeKind::Load, "Load L", self.loads, 1, 1.45);

        for k in 1..=self.routers {
            let x = if self.routers == 1 {
                0.5
            } else {
                0.3 + 0.4 * (k - 1) as f64 / (self.routers - 1) as f64
            };
            b.node(&format!("router{k}"), NodeKind::Router, &format!("Router R{k}"), x, 0.08);
        }
        for k in 1..self.routers {
            b.link(&format!("router{k}"), &format!("router{}", k + 1), EdgeKind::Cyber);
        }
        for k in 1..=self.hmis {
            b.node(
                &format!("hmi{k}"),
                NodeKind::Hmi,
                &format!("HMI {k}"),
                0.92,
                0.05 + 0.06 * (k - 1) as f64,
            );
            b.link(&format!("hmi{k}"), "router1", EdgeKind::Cyber);
        }

        for k in 1..=self.pmus {
            let x = (k as f64 - 0.5) / self.pmus as f64;
            b.node(&format!("pmu{k}"), NodeKind::Pmu, &format!("PMU {k}"), x, 0.30);
            b.link(&format!("pmu{k}"), &self.router_for(k), EdgeKind::Cyber);
        }
        for k in 1..=self.plcs {
            let x = (k as f64 - 0.5) / self.plcs as f64;
            b.node(&format!("plc{k}"), NodeKind::Plc, &format!("PLC {k}"), x, 0.20);
            b.link(&format!("plc{k}"), &self.router_for(k), EdgeKind::Cyber);
        }

        for k in 1..=self.pmus {
            let bus = self.bus_slot(k, self.pmus, 0);
            b.link(&format!("pmu{k}"), &format!("bus{bus}"), EdgeKind::Coupling);
        }
        for k in 1..=self.plcs {
            let generator = (k - 1) % self.generators.max(1) + 1;
            b.link(&format!("plc{k}"), &format!("gen{generator}"), EdgeKind::Coupling);
        }
        b
    }

    /// Hang `count` devices off evenly spaced ring buses, shifted by `offset` slots.
    #[allow(clippy::too_many_arguments)]
    fn attach(
        &self,
        b: &mut TopologyBuilder,
        prefix: &str,
        kind: NodeKind,
        label: &str,
        count: usize,
        offset: usize,
        reach: f64,
    ) {
        for k in 1..=count {
            let bus = self.bus_slot(k, count, offset);
            let (x, y) = self.ring_point(bus, reach);
            let id = format!("{prefix}{k}");
            b.node(&id, kind, &format!("{label}{k}"), x, y);
            b.link(&id, &format!("bus{bus}"), EdgeKind::Physical);
        }
    }

    fn bus_slot(&self, k: usize, count: usize, offset: usize) -> usize {
        ((k - 1) * self.buses / count.max(1) + offset) % self.buses + 1
    }

    fn router_for(&self, k: usize) -> String {
        format!("router{}", (k - 1) % self.routers.max(1) + 1)
    }

    fn ring_point(&self, bus: usize, reach: f64) -> (f64, f64) {
        let angle = 2.0 * PI * (bus - 1) as f64 / self.buses as f64;
        (
            RING_CENTER.0 + reach * RING_RADIUS.0 * angle.cos(),
            RING_CENTER.1 + reach * RING_RADIUS.1 * angle.sin(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};

    use super::*;
    use crate::graph::{Layer, NodeStatus};

    fn connected(graph: &GridGraph) -> bool {
        let Some(first) = graph.nodes.first() else {
            return true;
        };
        let mut seen = HashSet::from([first.id.as_str()]);
        let mut queue = VecDeque::from([first.id.as_str()]);
        while let Some(current) = queue.pop_front() {
            for next in graph.neighbors(current) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.len() == graph.nodes.len()
    }

    #[test]
    fn presets_have_declared_sizes_and_are_valid() {
        for id in TopologyId::ALL {
            let graph = build_topology(id);
            assert_eq!(graph.nodes.len(), id.node_count(), "{id}");
            assert_eq!(graph.topology, id);
            graph.validate().unwrap();
            assert!(connected(&graph), "{id} should be connected");
        }
    }

    #[test]
    fn building_is_deterministic() {
        for id in TopologyId::ALL {
            assert_eq!(build_topology(id), build_topology(id));
        }
    }

    #[test]
    fn presets_span_both_layers_and_all_edge_kinds() {
        for id in TopologyId::ALL {
            let graph = build_topology(id);
            assert!(graph.nodes.iter().any(|n| n.layer == Layer::Physical));
            assert!(graph.nodes.iter().any(|n| n.layer == Layer::Cyber));
            for kind in [EdgeKind::Physical, EdgeKind::Cyber, EdgeKind::Coupling] {
                assert!(graph.edges.iter().any(|e| e.kind == kind), "{id} lacks {kind:?}");
            }
            let kinds: HashSet<NodeKind> = graph.nodes.iter().map(|n| n.kind).collect();
            assert_eq!(kinds.len(), 8, "{id} should use the full kind vocabulary");
        }
    }

    #[test]
    fn nodes_start_at_rest_inside_unit_square() {
        let graph = build_topology(TopologyId::Ieee57);
        for node in &graph.nodes {
            assert_eq!(node.status, NodeStatus::Normal);
            assert_eq!(node.anomaly_score, 0.0);
            assert!((0.0..=1.0).contains(&node.position.x));
            assert!((0.0..=1.0).contains(&node.position.y));
        }
    }

    #[test]
    fn bus6_neighbourhood_in_ieee14() {
        let graph = build_topology(TopologyId::Ieee14);
        assert_eq!(graph.neighbors("bus6"), vec!["xfmr1", "load1", "pmu1"]);
    }

    #[test]
    fn parsing_accepts_aliases_and_rejects_unknown() {
        assert_eq!("IEEE-30".parse::<TopologyId>().unwrap(), TopologyId::Ieee30);
        assert_eq!("57".parse::<TopologyId>().unwrap(), TopologyId::Ieee57);
        assert_eq!(
            "ieee118".parse::<TopologyId>().unwrap_err(),
            SimError::InvalidTopology("ieee118".into())
        );
    }
}
