//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Prometheus instrumentation for simulation sessions."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use sg_ids_metrics::prometheus::{
    self, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
};
use sg_ids_metrics::SharedRegistry;

use crate::attack::AttackType;

/// Metrics published by the session manager.
#[derive(Clone)]
pub struct SimulationMetrics {
    registry: SharedRegistry,
    sessions_active: IntGauge,
    attacks_injected_total: IntCounterVec,
    detections_total: IntCounterVec,
    stale_resolutions_total: IntCounter,
    detection_latency_seconds: Histogram,
}

impl SimulationMetrics {
    /// Register the simulation metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let sessions_active = IntGauge::new(
            "sg_ids_sessions_active",
            "Number of simulation sessions currently held by the manager",
        )?;
        registry.register(Box::new(sessions_active.clone()))?;

        let attacks_injected_total = IntCounterVec::new(
            Opts::new(
                "sg_ids_attacks_injected_total",
                "Attacks accepted for injection, by attack type",
            ),
            &["attack_type"],
        )?;
        registry.register(Box::new(attacks_injected_total.clone()))?;

        let detections_total = IntCounterVec::new(
            Opts::new(
                "sg_ids_detections_total",
                "Detection results published to sessions, by attack type",
            ),
            &["attack_type"],
        )?;
        registry.register(Box::new(detections_total.clone()))?;

        let stale_resolutions_total = IntCounter::new(
            "sg_ids_stale_resolutions_total",
            "Detections discarded because the session moved on before they resolved",
        )?;
        registry.register(Box::new(stale_resolutions_total.clone()))?;

        let histogram_opts = HistogramOpts::new(
            "sg_ids_detection_latency_seconds",
            "Simulated inference latency between injection and published detection",
        )
        .buckets(prometheus::linear_buckets(0.1, 0.1, 15)?);
        let detection_latency_seconds = Histogram::with_opts(histogram_opts)?;
        registry.register(Box::new(detection_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            sessions_active,
            attacks_injected_total,
            detections_total,
            stale_resolutions_total,
            detection_latency_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn set_sessions_active(&self, count: usize) {
        self.sessions_active.set(count as i64);
    }

    pub fn inc_attack(&self, attack: AttackType) {
        self.attacks_injected_total
            .with_label_values(&[attack.tag()])
            .inc();
    }

    /// Count a published detection and the latency it was held back for.
    pub fn observe_detection(&self, attack: AttackType, latency: Duration) {
        self.detections_total
            .with_label_values(&[attack.tag()])
            .inc();
        self.detection_latency_seconds
            .observe(latency.as_secs_f64());
    }

    pub fn inc_stale_resolution(&self) {
        self.stale_resolutions_total.inc();
    }
}

impl std::fmt::Debug for SimulationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_ids_metrics::new_registry;

    #[test]
    fn counters_are_labelled_by_attack_tag() {
        let metrics = SimulationMetrics::new(new_registry()).unwrap();
        metrics.inc_attack(AttackType::FalseDataInjection);
        metrics.inc_attack(AttackType::FalseDataInjection);
        metrics.observe_detection(AttackType::Backdoor, Duration::from_millis(700));
        metrics.inc_stale_resolution();
        metrics.set_sessions_active(3);

        let families = metrics.registry().gather();
        let find = |name: &str| {
            families
                .iter()
                .find(|family| family.get_name() == name)
                .unwrap_or_else(|| panic!("missing {name}"))
        };

        let injected = find("sg_ids_attacks_injected_total");
        let sample = &injected.get_metric()[0];
        assert_eq!(sample.get_label()[0].get_value(), "FDI");
        assert_eq!(sample.get_counter().get_value(), 2.0);

        let active = find("sg_ids_sessions_active");
        assert_eq!(active.get_metric()[0].get_gauge().get_value(), 3.0);

        let latency = find("sg_ids_detection_latency_seconds");
        assert_eq!(latency.get_metric()[0].get_histogram().get_sample_count(), 1);

        let stale = find("sg_ids_stale_resolutions_total");
        assert_eq!(stale.get_metric()[0].get_counter().get_value(), 1.0);
    }

    #[test]
    fn double_registration_fails() {
        let registry = new_registry();
        SimulationMetrics::new(registry.clone()).unwrap();
        assert!(SimulationMetrics::new(registry).is_err());
    }
}
