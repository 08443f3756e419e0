//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Simulation session state machine."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
//! A single lab run: `Idle -> Running <-> AttackActive -> Idle`.
//!
//! Every transition that invalidates in-flight detections (start, stop,
//! clear) bumps the session generation. Detection tickets carry the generation
//! they were issued under and are discarded on resolution when it no longer
//! matches.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sg_ids_common::SimulationConfig;
use tracing::{debug, info};
use uuid::Uuid;

use crate::attack::AttackType;
use crate::detection::{mitigations_for, synthesize, DetectionProfile, DetectionResult};
use crate::error::{Result, SimError};
use crate::events::{EventKind, EventLog, SimulationEvent};
use crate::graph::{GridEdge, GridNode};
use crate::health::{compute_metrics, HealthMetrics, MetricsDelta};
use crate::injector::{inject_attack, DEFAULT_NEIGHBOR_LIMIT};
use crate::topology::{build_topology, TopologyId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    AttackActive,
}

impl SessionPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionPhase::Running | SessionPhase::AttackActive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Running => "running",
            SessionPhase::AttackActive => "attack_active",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cosmetic load profile echoed in the start event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadProfile {
    #[default]
    Nominal,
    Peak,
    OffPeak,
}

/// Cosmetic observability mode echoed in the start event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Observability {
    #[default]
    Full,
    Partial,
    Sparse,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StartConfig {
    #[serde(default)]
    pub topology: TopologyId,
    #[serde(default)]
    pub load_profile: LoadProfile,
    #[serde(default)]
    pub observability: Observability,
}

impl StartConfig {
    pub fn new(topology: TopologyId) -> Self {
        Self {
            topology,
            ..Self::default()
        }
    }
}

/// Per-session tunables derived from [`SimulationConfig`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub neighbor_limit: usize,
    pub detection: DetectionProfile,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            neighbor_limit: DEFAULT_NEIGHBOR_LIMIT,
            detection: DetectionProfile::default(),
        }
    }
}

impl From<&SimulationConfig> for SessionSettings {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            neighbor_limit: config.neighbor_limit,
            detection: DetectionProfile::from(config),
        }
    }
}

/// A detection drawn at injection time, to be resolved after `delay`.
#[derive(Debug, Clone)]
pub struct DetectionTicket {
    pub session_id: Uuid,
    pub generation: u64,
    /// Ordinal of the injection that drew this ticket, counted from 1.
    pub injection: u64,
    pub delay: Duration,
    pub result: DetectionResult,
}

/// Serialisable picture of a session for consuming views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionView {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub is_running: bool,
    pub generation: u64,
    pub topology: TopologyId,
    pub config: StartConfig,
    pub started_at: Option<DateTime<Utc>>,
    pub nodes: Vec<GridNode>,
    pub edges: Vec<GridEdge>,
    pub before_attack_nodes: Vec<GridNode>,
    pub highlighted_node_ids: Vec<String>,
    pub metrics_before: Option<HealthMetrics>,
    pub metrics_after: HealthMetrics,
    pub delta: Option<MetricsDelta>,
    pub events: Vec<SimulationEvent>,
    pub latest_result: Option<DetectionResult>,
    pub mitigations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub topology: TopologyId,
    pub event_count: usize,
}

#[derive(Debug)]
pub struct SimulationSession {
    id: Uuid,
    phase: SessionPhase,
    generation: u64,
    config: StartConfig,
    started_at: Option<DateTime<Utc>>,
    nodes: Vec<GridNode>,
    edges: Vec<GridEdge>,
    before_attack_nodes: Vec<GridNode>,
    highlighted_node_ids: Vec<String>,
    events: EventLog,
    latest_result: Option<DetectionResult>,
    injections: u64,
    resolved_injection: Option<u64>,
    mitigations: Vec<String>,
    settings: SessionSettings,
    rng: StdRng,
}

impl SimulationSession {
    /// Create an idle session whose random draws are seeded from `seed`.
    pub fn new(id: Uuid, settings: SessionSettings, seed: u64) -> Self {
        Self {
            id,
            phase: SessionPhase::Idle,
            generation: 0,
            config: StartConfig::default(),
            started_at: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            before_attack_nodes: Vec::new(),
            highlighted_node_ids: Vec::new(),
            events: EventLog::default(),
            latest_result: None,
            injections: 0,
            resolved_injection: None,
            mitigations: Vec::new(),
            settings,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &StartConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[GridNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GridEdge] {
        &self.edges
    }

    pub fn before_attack_nodes(&self) -> &[GridNode] {
        &self.before_attack_nodes
    }

    pub fn highlighted_node_ids(&self) -> &[String] {
        &self.highlighted_node_ids
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn latest_result(&self) -> Option<&DetectionResult> {
        self.latest_result.as_ref()
    }

    /// The published result, but only when it belongs to the most recent injection.
    pub fn current_result(&self) -> Option<&DetectionResult> {
        if self.injections > 0 && self.resolved_injection == Some(self.injections) {
            self.latest_result.as_ref()
        } else {
            None
        }
    }

    pub fn mitigations(&self) -> &[String] {
        &self.mitigations
    }

    /// Health of the live node set.
    pub fn metrics(&self) -> HealthMetrics {
        compute_metrics(&self.nodes)
    }

    /// Health of the pre-injection snapshot, once one exists.
    pub fn metrics_before(&self) -> Option<HealthMetrics> {
        if self.before_attack_nodes.is_empty() {
            None
        } else {
            Some(compute_metrics(&self.before_attack_nodes))
        }
    }

    /// Begin (or restart) a run on a freshly built topology.
    pub fn start(&mut self, config: StartConfig) {
        let graph = build_topology(config.topology);
        self.generation += 1;
        self.phase = SessionPhase::Running;
        self.config = config;
        self.started_at = Some(Utc::now());
        self.nodes = graph.nodes;
        self.edges = graph.edges;
        self.before_attack_nodes.clear();
        self.highlighted_node_ids.clear();
        self.latest_result = None;
        self.resolved_injection = None;
        self.mitigations.clear();
        self.events = EventLog::default();
        self.events.append(
            EventKind::StatusChange,
            format!(
                "Simulation started on {} ({} nodes, {} edges), load profile {:?}, observability {:?}",
                config.topology,
                self.nodes.len(),
                self.edges.len(),
                config.load_profile,
                config.observability,
            ),
        );
        info!(
            session_id = %self.id,
            topology = %config.topology,
            generation = self.generation,
            "simulation session started"
        );
    }

    /// End the run. The graph is kept so a view can still render the final state.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_running("stop")?;
        self.generation += 1;
        self.phase = SessionPhase::Idle;
        self.events
            .append(EventKind::StatusChange, "Simulation stopped");
        info!(session_id = %self.id, generation = self.generation, "simulation session stopped");
        Ok(())
    }

    /// Inject an attack and draw the detection to be published later.
    ///
    /// The live nodes are snapshotted into `before_attack_nodes` before they are
    /// replaced by the mutated set. Rejected requests leave the session untouched.
    pub fn inject_attack(&mut self, target: &str, attack: AttackType) -> Result<DetectionTicket> {
        self.ensure_running("inject_attack")?;
        let injection = inject_attack(
            &self.nodes,
            &self.edges,
            target,
            attack,
            self.settings.neighbor_limit,
            &mut self.rng,
        )?;

        self.before_attack_nodes = std::mem::replace(&mut self.nodes, injection.nodes);
        self.highlighted_node_ids = injection.affected_node_ids;
        self.phase = SessionPhase::AttackActive;
        self.injections += 1;
        self.events.append(
            EventKind::AttackInjected,
            format!(
                "{} ({}) attack injected at {}; affected nodes: {}",
                attack,
                attack.name(),
                target,
                self.highlighted_node_ids.join(", ")
            ),
        );

        let pending = synthesize(
            attack,
            &self.highlighted_node_ids,
            &self.settings.detection,
            &mut self.rng,
        );
        info!(
            session_id = %self.id,
            target = %target,
            attack_type = %attack,
            affected = self.highlighted_node_ids.len(),
            delay_ms = pending.delay.as_millis() as u64,
            "attack injected"
        );
        Ok(DetectionTicket {
            session_id: self.id,
            generation: self.generation,
            injection: self.injections,
            delay: pending.delay,
            result: pending.result,
        })
    }

    /// Publish a ticket's result. Last resolution wins.
    ///
    /// Tickets from an earlier generation yield [`SimError::StaleResolution`]
    /// and leave the session untouched.
    pub fn resolve_detection(&mut self, ticket: DetectionTicket) -> Result<&DetectionResult> {
        if ticket.generation != self.generation {
            debug!(
                session_id = %self.id,
                issued = ticket.generation,
                current = self.generation,
                "discarding stale detection"
            );
            return Err(SimError::StaleResolution {
                issued: ticket.generation,
                current: self.generation,
            });
        }

        let mut result = ticket.result;
        result.detected_at = Utc::now();
        self.resolved_injection = Some(ticket.injection);
        self.events.append(
            EventKind::Detection,
            format!(
                "{} classified {:?} with {:.1}% confidence (p={:.3}, inference {:.1} ms)",
                result.attack_type,
                result.classification,
                result.confidence_score * 100.0,
                result.probability,
                result.inference_time_ms,
            ),
        );
        self.mitigations = mitigations_for(result.attack_type)
            .iter()
            .map(|text| (*text).to_owned())
            .collect();
        info!(
            session_id = %self.id,
            attack_type = %result.attack_type,
            confidence = result.confidence_score,
            "detection published"
        );
        Ok(self.latest_result.insert(result))
    }

    /// Return every node to baseline without ending the run.
    ///
    /// The event history and the last before-snapshot are kept.
    pub fn clear_attacks(&mut self) -> Result<()> {
        self.ensure_running("clear_attacks")?;
        for node in &mut self.nodes {
            node.reset();
        }
        self.highlighted_node_ids.clear();
        self.latest_result = None;
        self.resolved_injection = None;
        self.mitigations.clear();
        self.generation += 1;
        self.phase = SessionPhase::Running;
        self.events.append(
            EventKind::StatusChange,
            format!("Attacks cleared; {} nodes restored to baseline", self.nodes.len()),
        );
        info!(session_id = %self.id, generation = self.generation, "attacks cleared");
        Ok(())
    }

    /// Record that the operator applied one of the published recommendations.
    pub fn acknowledge_mitigation(&mut self, index: usize) -> Result<String> {
        self.ensure_running("acknowledge_mitigation")?;
        let Some(recommendation) = self.mitigations.get(index).cloned() else {
            return Err(SimError::UnknownMitigation {
                index,
                available: self.mitigations.len(),
            });
        };
        self.events.append(
            EventKind::Mitigation,
            format!("Mitigation applied: {recommendation}"),
        );
        info!(session_id = %self.id, index, "mitigation acknowledged");
        Ok(recommendation)
    }

    pub fn view(&self) -> SessionView {
        let metrics_after = self.metrics();
        let metrics_before = self.metrics_before();
        SessionView {
            id: self.id,
            phase: self.phase,
            is_running: self.is_running(),
            generation: self.generation,
            topology: self.config.topology,
            config: self.config,
            started_at: self.started_at,
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            before_attack_nodes: self.before_attack_nodes.clone(),
            highlighted_node_ids: self.highlighted_node_ids.clone(),
            metrics_before,
            metrics_after,
            delta: metrics_before.map(|before| MetricsDelta::between(&before, &metrics_after)),
            events: self.events.entries().to_vec(),
            latest_result: self.latest_result.clone(),
            mitigations: self.mitigations.clone(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            phase: self.phase,
            topology: self.config.topology,
            event_count: self.events.len(),
        }
    }

    fn ensure_running(&self, operation: &'static str) -> Result<()> {
        if self.phase.is_running() {
            Ok(())
        } else {
            Err(SimError::InvalidState {
                operation,
                phase: self.phase,
            })
        }
    }
}
