//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Node-set health aggregation for before/after comparison."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::graph::{GridNode, NodeStatus};

/// Summary counts over a node set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct HealthMetrics {
    pub critical_count: usize,
    pub warning_count: usize,
    pub avg_anomaly_score: f64,
}

/// Aggregate the health of `nodes`. Pure; an empty slice yields all zeros.
pub fn compute_metrics(nodes: &[GridNode]) -> HealthMetrics {
    let mut metrics = HealthMetrics::default();
    if nodes.is_empty() {
        return metrics;
    }
    let mut score_sum = 0.0;
    for node in nodes {
        match node.status {
            NodeStatus::Critical => metrics.critical_count += 1,
            NodeStatus::Warning => metrics.warning_count += 1,
            NodeStatus::Normal | NodeStatus::Offline => {}
        }
        score_sum += node.anomaly_score;
    }
    metrics.avg_anomaly_score = score_sum / nodes.len() as f64;
    metrics
}

/// Signed change from a before snapshot to the live node set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct MetricsDelta {
    pub critical_count: i64,
    pub warning_count: i64,
    pub avg_anomaly_score: f64,
}

impl MetricsDelta {
    pub fn between(before: &HealthMetrics, after: &HealthMetrics) -> Self {
        Self {
            critical_count: after.critical_count as i64 - before.critical_count as i64,
            warning_count: after.warning_count as i64 - before.warning_count as i64,
            avg_anomaly_score: after.avg_anomaly_score - before.avg_anomaly_score,
        }
    }
}
