//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Error taxonomy for the simulation engine."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use thiserror::Error;
use uuid::Uuid;

use crate::session::SessionPhase;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimError {
    #[error("unknown topology '{0}'")]
    InvalidTopology(String),
    #[error("unknown attack type '{0}'")]
    InvalidAttackType(String),
    #[error("target node '{0}' does not exist in the current graph")]
    InvalidTarget(String),
    #[error("{operation} is not permitted while the session is {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },
    #[error("detection issued under generation {issued} discarded (session at generation {current})")]
    StaleResolution { issued: u64, current: u64 },
    #[error("session {0} not found")]
    UnknownSession(Uuid),
    #[error("mitigation recommendation {index} not available ({available} published)")]
    UnknownMitigation { index: usize, available: usize },
    #[error("session capacity of {0} reached")]
    CapacityExceeded(usize),
    #[error("malformed topology: {0}")]
    Topology(String),
}

impl SimError {
    /// Short machine-readable code used by logs and the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            SimError::InvalidTopology(_) => "invalid_topology",
            SimError::InvalidAttackType(_) => "invalid_attack_type",
            SimError::InvalidTarget(_) => "invalid_target",
            SimError::InvalidState { .. } => "invalid_state",
            SimError::StaleResolution { .. } => "stale_resolution",
            SimError::UnknownSession(_) => "unknown_session",
            SimError::UnknownMitigation { .. } => "unknown_mitigation",
            SimError::CapacityExceeded(_) => "capacity_exceeded",
            SimError::Topology(_) => "malformed_topology",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_operation_and_phase() {
        let err = SimError::InvalidState {
            operation: "inject_attack",
            phase: SessionPhase::Idle,
        };
        assert_eq!(
            err.to_string(),
            "inject_attack is not permitted while the session is idle"
        );
        assert_eq!(err.code(), "invalid_state");
    }
}
