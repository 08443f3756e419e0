//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Session registry and asynchronous detection scheduling."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use sg_ids_common::SimulationConfig;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attack::AttackType;
use crate::detection::DetectionResult;
use crate::error::{Result, SimError};
use crate::metrics::SimulationMetrics;
use crate::session::{
    DetectionTicket, SessionSettings, SessionSummary, SessionView, SimulationSession, StartConfig,
};
use crate::topology::TopologyId;

const DETECTION_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One registered session plus the detection tasks still sleeping on its behalf.
#[derive(Debug)]
struct SessionSlot {
    session: Mutex<SimulationSession>,
    pending: Mutex<Vec<AbortHandle>>,
}

impl SessionSlot {
    fn track(&self, handle: AbortHandle) {
        let mut pending = self.pending.lock();
        pending.retain(|existing| !existing.is_finished());
        pending.push(handle);
    }

    fn abort_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        for handle in pending.drain(..) {
            handle.abort();
        }
        count
    }
}

/// Registry of independent simulation sessions.
///
/// Each session sits behind its own mutex so operations on one session never
/// wait on another. Detection results are published by Tokio tasks, so
/// [`SessionManager::inject_attack`] must be called from within a runtime.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<IndexMap<Uuid, Arc<SessionSlot>>>,
    settings: SessionSettings,
    default_topology: TopologyId,
    random_seed: u64,
    max_sessions: usize,
    next_ordinal: AtomicU64,
    metrics: Option<SimulationMetrics>,
}

impl SessionManager {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let default_topology = config.default_topology.parse()?;
        Ok(Self {
            sessions: RwLock::new(IndexMap::new()),
            settings: SessionSettings::from(config),
            default_topology,
            random_seed: config.random_seed,
            max_sessions: config.max_sessions,
            next_ordinal: AtomicU64::new(0),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: SimulationMetrics) -> Self {
        metrics.set_sessions_active(self.len());
        self.metrics = Some(metrics);
        self
    }

    pub fn default_topology(&self) -> TopologyId {
        self.default_topology
    }

    pub fn default_start_config(&self) -> StartConfig {
        StartConfig::new(self.default_topology)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Register a new idle session. The session RNG is seeded with the
    /// configured seed offset by the session's creation ordinal.
    pub fn create_session(&self) -> Result<Uuid> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            warn!(max_sessions = self.max_sessions, "session capacity reached");
            return Err(SimError::CapacityExceeded(self.max_sessions));
        }
        let ordinal = self.next_ordinal.fetch_add(1, Ordering::Relaxed);
        let id = Uuid::new_v4();
        let seed = self.random_seed.wrapping_add(ordinal);
        let session = SimulationSession::new(id, self.settings.clone(), seed);
        sessions.insert(
            id,
            Arc::new(SessionSlot {
                session: Mutex::new(session),
                pending: Mutex::new(Vec::new()),
            }),
        );
        if let Some(metrics) = &self.metrics {
            metrics.set_sessions_active(sessions.len());
        }
        info!(session_id = %id, ordinal, seed, "session created");
        Ok(id)
    }

    /// Drop a session, cancelling any detection still in flight for it.
    pub fn remove_session(&self, id: Uuid) -> Result<()> {
        let slot = {
            let mut sessions = self.sessions.write();
            let slot = sessions
                .shift_remove(&id)
                .ok_or(SimError::UnknownSession(id))?;
            if let Some(metrics) = &self.metrics {
                metrics.set_sessions_active(sessions.len());
            }
            slot
        };
        let aborted = slot.abort_pending();
        info!(session_id = %id, aborted, "session removed");
        Ok(())
    }

    /// Sessions in creation order.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let slots: Vec<Arc<SessionSlot>> = self.sessions.read().values().cloned().collect();
        slots
            .iter()
            .map(|slot| slot.session.lock().summary())
            .collect()
    }

    pub fn start(&self, id: Uuid, config: StartConfig) -> Result<SessionView> {
        let slot = self.slot(id)?;
        let view = {
            let mut session = slot.session.lock();
            session.start(config);
            session.view()
        };
        self.cancel_pending(id, &slot);
        Ok(view)
    }

    pub fn stop(&self, id: Uuid) -> Result<SessionView> {
        let slot = self.slot(id)?;
        let view = {
            let mut session = slot.session.lock();
            session.stop()?;
            session.view()
        };
        self.cancel_pending(id, &slot);
        Ok(view)
    }

    /// Inject an attack and schedule its detection.
    ///
    /// Returns the affected node ids as soon as the graph has been mutated; the
    /// detection is published by a background task after the drawn delay.
    pub fn inject_attack(&self, id: Uuid, target: &str, attack: AttackType) -> Result<Vec<String>> {
        let slot = self.slot(id)?;
        let (ticket, affected) = {
            let mut session = slot.session.lock();
            let ticket = session.inject_attack(target, attack)?;
            let affected = session.highlighted_node_ids().to_vec();
            (ticket, affected)
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_attack(attack);
        }

        let task_slot = Arc::clone(&slot);
        let metrics = self.metrics.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ticket.delay).await;
            publish_detection(&task_slot, ticket, metrics.as_ref());
        });
        slot.track(handle.abort_handle());
        Ok(affected)
    }

    pub fn clear_attacks(&self, id: Uuid) -> Result<SessionView> {
        let slot = self.slot(id)?;
        let view = {
            let mut session = slot.session.lock();
            session.clear_attacks()?;
            session.view()
        };
        self.cancel_pending(id, &slot);
        Ok(view)
    }

    pub fn acknowledge_mitigation(&self, id: Uuid, index: usize) -> Result<SessionView> {
        let slot = self.slot(id)?;
        let mut session = slot.session.lock();
        session.acknowledge_mitigation(index)?;
        Ok(session.view())
    }

    pub fn view(&self, id: Uuid) -> Result<SessionView> {
        let slot = self.slot(id)?;
        let view = slot.session.lock().view();
        Ok(view)
    }

    /// Poll until the detection for the most recent injection is published or
    /// `timeout` elapses. A result left over from an earlier injection does not count.
    pub async fn await_detection(
        &self,
        id: Uuid,
        timeout: Duration,
    ) -> Result<Option<DetectionResult>> {
        let slot = self.slot(id)?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = slot.session.lock().current_result().cloned();
            if current.is_some() {
                return Ok(current);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(DETECTION_POLL_INTERVAL).await;
        }
    }

    fn slot(&self, id: Uuid) -> Result<Arc<SessionSlot>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(SimError::UnknownSession(id))
    }

    fn cancel_pending(&self, id: Uuid, slot: &SessionSlot) {
        let aborted = slot.abort_pending();
        if aborted > 0 {
            debug!(session_id = %id, aborted, "pending detections cancelled");
        }
    }
}

fn publish_detection(slot: &SessionSlot, ticket: DetectionTicket, metrics: Option<&SimulationMetrics>) {
    let session_id = ticket.session_id;
    let attack = ticket.result.attack_type;
    let delay = ticket.delay;
    let mut session = slot.session.lock();
    match session.resolve_detection(ticket) {
        Ok(_) => {
            if let Some(metrics) = metrics {
                metrics.observe_detection(attack, delay);
            }
        }
        Err(SimError::StaleResolution { .. }) => {
            if let Some(metrics) = metrics {
                metrics.inc_stale_resolution();
            }
        }
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "detection could not be published");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPhase;

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            detection_delay_min: Duration::from_millis(5),
            detection_delay_max: Duration::from_millis(15),
            max_sessions: 2,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn unknown_default_topology_is_rejected() {
        let config = SimulationConfig {
            default_topology: "ieee118".into(),
            ..SimulationConfig::default()
        };
        assert_eq!(
            SessionManager::new(&config).unwrap_err(),
            SimError::InvalidTopology("ieee118".into())
        );
    }

    #[test]
    fn capacity_is_enforced() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        manager.create_session().unwrap();
        let second = manager.create_session().unwrap();
        assert_eq!(
            manager.create_session().unwrap_err(),
            SimError::CapacityExceeded(2)
        );
        manager.remove_session(second).unwrap();
        assert!(manager.create_session().is_ok());
    }

    #[test]
    fn sessions_are_listed_in_creation_order() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        let first = manager.create_session().unwrap();
        let second = manager.create_session().unwrap();
        manager
            .start(second, StartConfig::new(TopologyId::Ieee30))
            .unwrap();
        let listed = manager.list_sessions();
        assert_eq!(listed[0].id, first);
        assert_eq!(listed[0].phase, SessionPhase::Idle);
        assert_eq!(listed[1].id, second);
        assert_eq!(listed[1].topology, TopologyId::Ieee30);
    }

    #[test]
    fn unknown_session_is_reported() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        let id = Uuid::new_v4();
        assert_eq!(manager.view(id).unwrap_err(), SimError::UnknownSession(id));
        assert_eq!(
            manager.remove_session(id).unwrap_err(),
            SimError::UnknownSession(id)
        );
    }

    #[tokio::test]
    async fn detection_is_published_after_delay() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        let id = manager.create_session().unwrap();
        manager.start(id, manager.default_start_config()).unwrap();
        let affected = manager
            .inject_attack(id, "bus6", AttackType::FalseDataInjection)
            .unwrap();
        assert_eq!(affected, vec!["bus6", "xfmr1", "load1"]);
        assert!(manager.view(id).unwrap().latest_result.is_none());

        let result = manager
            .await_detection(id, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("detection published");
        assert_eq!(result.affected_nodes, affected);
        assert_eq!(manager.view(id).unwrap().mitigations.len(), 4);
    }

    #[tokio::test]
    async fn detection_waking_after_clear_is_counted_stale() {
        let metrics = SimulationMetrics::new(sg_ids_metrics::new_registry()).unwrap();
        let manager = SessionManager::new(&fast_config())
            .unwrap()
            .with_metrics(metrics.clone());
        let id = manager.create_session().unwrap();
        manager.start(id, manager.default_start_config()).unwrap();

        let slot = manager.slot(id).unwrap();
        let ticket = slot
            .session
            .lock()
            .inject_attack("bus6", AttackType::Backdoor)
            .unwrap();
        manager.clear_attacks(id).unwrap();
        publish_detection(&slot, ticket, Some(&metrics));

        let stale = metrics
            .registry()
            .gather()
            .iter()
            .find(|family| family.get_name() == "sg_ids_stale_resolutions_total")
            .map(|family| family.get_metric()[0].get_counter().get_value())
            .unwrap_or(0.0);
        assert_eq!(stale, 1.0);
        assert!(manager.view(id).unwrap().latest_result.is_none());
    }

    #[tokio::test]
    async fn await_detection_ignores_an_earlier_result() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        let id = manager.create_session().unwrap();
        manager.start(id, manager.default_start_config()).unwrap();
        manager
            .inject_attack(id, "bus6", AttackType::FalseDataInjection)
            .unwrap();
        manager
            .await_detection(id, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("first detection");

        manager
            .inject_attack(id, "hmi1", AttackType::BruteForce)
            .unwrap();
        let second = manager
            .await_detection(id, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("second detection");
        assert_eq!(second.attack_type, AttackType::BruteForce);
    }

    #[tokio::test]
    async fn await_detection_times_out_without_injection() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        let id = manager.create_session().unwrap();
        manager.start(id, manager.default_start_config()).unwrap();
        let result = manager
            .await_detection(id, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn stop_cancels_pending_detection() {
        let manager = SessionManager::new(&fast_config()).unwrap();
        let id = manager.create_session().unwrap();
        manager.start(id, manager.default_start_config()).unwrap();
        manager
            .inject_attack(id, "bus6", AttackType::Ransomware)
            .unwrap();
        manager.stop(id).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let view = manager.view(id).unwrap();
        assert!(view.latest_result.is_none());
        assert_eq!(view.phase, SessionPhase::Idle);
    }
}
