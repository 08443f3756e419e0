//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Attack injection with single-hop neighbour propagation."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::ops::Range;

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::attack::AttackType;
use crate::error::{Result, SimError};
use crate::graph::{neighbors, GridEdge, GridNode};

/// Anomaly scores assigned to affected nodes are drawn uniformly from this range.
pub const ATTACK_SCORE_RANGE: Range<f64> = 0.7..1.0;

/// Default number of direct neighbours dragged into an injection.
pub const DEFAULT_NEIGHBOR_LIMIT: usize = 2;

/// Outcome of an injection: the affected ids and the mutated working copy.
#[derive(Debug, Clone, Serialize)]
pub struct Injection {
    pub affected_node_ids: Vec<String>,
    pub nodes: Vec<GridNode>,
}

/// Mark `target` and up to `neighbor_limit` of its direct neighbours as critical.
///
/// Neighbours are taken in edge-declaration order, not ranked by weight or
/// distance. Nodes outside the affected set are copied unchanged, so earlier
/// injections stay elevated until explicitly cleared. Fails with
/// [`SimError::InvalidTarget`] when `target` is not in `nodes`.
pub fn inject_attack<R: Rng + ?Sized>(
    nodes: &[GridNode],
    edges: &[GridEdge],
    target: &str,
    attack: AttackType,
    neighbor_limit: usize,
    rng: &mut R,
) -> Result<Injection> {
    if !nodes.iter().any(|node| node.id == target) {
        return Err(SimError::InvalidTarget(target.to_owned()));
    }

    let mut affected_node_ids = vec![target.to_owned()];
    affected_node_ids.extend(
        neighbors(edges, target)
            .into_iter()
            .filter(|id| nodes.iter().any(|node| node.id == *id))
            .take(neighbor_limit)
            .map(str::to_owned),
    );

    let mut mutated = nodes.to_vec();
    for id in &affected_node_ids {
        if let Some(node) = mutated.iter_mut().find(|node| &node.id == id) {
            node.set_anomaly_score(rng.gen_range(ATTACK_SCORE_RANGE));
        }
    }

    debug!(
        target = %target,
        attack_type = %attack,
        affected = ?affected_node_ids,
        "attack propagated to neighbourhood"
    );
    Ok(Injection {
        affected_node_ids,
        nodes: mutated,
    })
}
