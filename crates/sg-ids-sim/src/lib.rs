//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Attack-injection simulation engine for the SG-IDS lab."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
//! Cyber-physical grid presets, attack injection with neighbour propagation,
//! synthetic detection results and the session state machine that ties them
//! together.

pub mod attack;
pub mod detection;
pub mod error;
pub mod events;
pub mod graph;
pub mod health;
pub mod injector;
pub mod manager;
pub mod metrics;
pub mod session;
pub mod topology;

pub use attack::AttackType;
pub use detection::{mitigations_for, Classification, DetectionProfile, DetectionResult};
pub use error::{Result, SimError};
pub use events::{EventKind, EventLog, SimulationEvent};
pub use graph::{EdgeKind, GridEdge, GridGraph, GridNode, Layer, NodeKind, NodeStatus, Position};
pub use health::{compute_metrics, HealthMetrics, MetricsDelta};
pub use injector::{inject_attack, Injection};
pub use manager::SessionManager;
pub use metrics::SimulationMetrics;
pub use session::{
    DetectionTicket, LoadProfile, Observability, SessionPhase, SessionSettings, SessionSummary,
    SessionView, SimulationSession, StartConfig,
};
pub use topology::{build_topology, TopologyId};

/// Crate prelude collecting the types most consumers need.
pub mod prelude {
    pub use super::attack::AttackType;
    pub use super::error::{Result, SimError};
    pub use super::manager::SessionManager;
    pub use super::session::{SessionPhase, SessionView, StartConfig};
    pub use super::topology::TopologyId;
}
