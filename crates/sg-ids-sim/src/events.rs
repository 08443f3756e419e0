//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Append-only session event log."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AttackInjected,
    Detection,
    Mitigation,
    StatusChange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationEvent {
    /// Position in the session log, starting at 1.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub message: String,
}

/// Events in order of completion. Entries are never removed; the log is only
/// replaced wholesale when a session restarts.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct EventLog {
    entries: Vec<SimulationEvent>,
}

impl EventLog {
    pub fn append(&mut self, kind: EventKind, message: impl Into<String>) -> &SimulationEvent {
        let sequence = self.entries.len() as u64 + 1;
        self.entries.push(SimulationEvent {
            sequence,
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[SimulationEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|event| event.kind == kind).count()
    }

    pub fn last(&self) -> Option<&SimulationEvent> {
        self.entries.last()
    }
}
