//! ---
//! ids_section: "11-simulation"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Attack type vocabulary shared by injection and detection."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Attack tag flowing through injection and result synthesis. The core applies
/// no type-specific logic beyond the mitigation lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AttackType {
    #[serde(rename = "RW")]
    Ransomware,
    #[serde(rename = "FDI")]
    FalseDataInjection,
    #[serde(rename = "RS")]
    ReverseShell,
    #[serde(rename = "BF")]
    BruteForce,
    #[serde(rename = "BD")]
    Backdoor,
}

impl AttackType {
    pub const ALL: [AttackType; 5] = [
        AttackType::Ransomware,
        AttackType::FalseDataInjection,
        AttackType::ReverseShell,
        AttackType::BruteForce,
        AttackType::Backdoor,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            AttackType::Ransomware => "RW",
            AttackType::FalseDataInjection => "FDI",
            AttackType::ReverseShell => "RS",
            AttackType::BruteForce => "BF",
            AttackType::Backdoor => "BD",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AttackType::Ransomware => "ransomware",
            AttackType::FalseDataInjection => "false data injection",
            AttackType::ReverseShell => "reverse shell",
            AttackType::BruteForce => "brute force",
            AttackType::Backdoor => "backdoor",
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AttackType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        AttackType::ALL
            .into_iter()
            .find(|attack| {
                attack.tag().eq_ignore_ascii_case(wanted)
                    || attack.name().eq_ignore_ascii_case(&wanted.replace(['-', '_'], " "))
            })
            .ok_or_else(|| SimError::InvalidAttackType(s.to_owned()))
    }
}
