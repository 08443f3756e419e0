//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Synthetic detection results and mitigation lookup."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::ops::Range;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sg_ids_common::SimulationConfig;

use crate::attack::AttackType;

pub const PROBABILITY_RANGE: Range<f64> = 0.85..0.99;
pub const CONFIDENCE_RANGE: Range<f64> = 0.80..0.99;
pub const INFERENCE_TIME_MS_RANGE: Range<f64> = 8.0..18.0;

/// Detector verdict. `Benign` is part of the wire vocabulary but is never
/// synthesized for an injected attack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Malicious,
    Benign,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    pub classification: Classification,
    pub probability: f64,
    pub attack_type: AttackType,
    pub affected_nodes: Vec<String>,
    pub confidence_score: f64,
    pub inference_time_ms: f64,
    pub detected_at: DateTime<Utc>,
}

/// Inference latency window applied before a result is published.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionProfile {
    pub delay: Range<Duration>,
}

impl Default for DetectionProfile {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500)..Duration::from_millis(1000),
        }
    }
}

impl From<&SimulationConfig> for DetectionProfile {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            delay: config.detection_delay_min..config.detection_delay_max,
        }
    }
}

/// A result drawn up front, to be published once `delay` has elapsed.
#[derive(Debug, Clone)]
pub struct PendingDetection {
    pub delay: Duration,
    pub result: DetectionResult,
}

/// Draw the latency and the classification for an injected attack.
///
/// Injected attacks are always classified malicious. All values come from `rng`
/// so a seeded session reproduces the same results.
pub fn synthesize<R: Rng + ?Sized>(
    attack_type: AttackType,
    affected_nodes: &[String],
    profile: &DetectionProfile,
    rng: &mut R,
) -> PendingDetection {
    let delay = if profile.delay.is_empty() {
        profile.delay.start
    } else {
        rng.gen_range(profile.delay.clone())
    };
    let result = DetectionResult {
        classification: Classification::Malicious,
        probability: rng.gen_range(PROBABILITY_RANGE),
        attack_type,
        affected_nodes: affected_nodes.to_vec(),
        confidence_score: rng.gen_range(CONFIDENCE_RANGE),
        inference_time_ms: rng.gen_range(INFERENCE_TIME_MS_RANGE),
        detected_at: Utc::now(),
    };
    PendingDetection { delay, result }
}

/// Recommended responses, four per attack type.
pub fn mitigations_for(attack_type: AttackType) -> [&'static str; 4] {
    match attack_type {
        AttackType::Ransomware => [
            "Isolate affected hosts from the OT network segment",
            "Restore PLC and HMI images from offline backups",
            "Block SMB and RDP lateral movement at substation firewalls",
            "Rotate credentials for engineering workstations",
        ],
        AttackType::FalseDataInjection => [
            "Cross-validate PMU measurements against state-estimation residuals",
            "Enable authenticated measurement channels (IEC 62351)",
            "Quarantine compromised sensor feeds from the control loop",
            "Re-run bad-data detection with tightened thresholds",
        ],
        AttackType::ReverseShell => [
            "Terminate outbound sessions originating from affected controllers",
            "Apply egress filtering on substation gateways",
            "Capture volatile memory on compromised hosts for forensics",
            "Patch the exploited services before reconnecting hosts",
        ],
        AttackType::BruteForce => [
            "Lock accounts exceeding the failed-login threshold",
            "Enforce multi-factor authentication for HMI access",
            "Rate-limit remote management interfaces",
            "Audit authentication logs for successful intrusions",
        ],
        AttackType::Backdoor => [
            "Verify controller firmware against known-good hashes",
            "Remove unauthorised persistence mechanisms",
            "Segment management VLANs away from field devices",
            "Monitor for beaconing to unknown external endpoints",
        ],
    }
}
