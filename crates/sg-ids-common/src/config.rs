//! ---
//! ids_section: "01-core-functionality"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "TOML configuration for the daemon and simulation engine."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9899"
        .parse()
        .expect("valid default metrics address")
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8088".parse().expect("valid default api address")
}

fn default_simulation_seed() -> u64 {
    0x5EED_1D5u64
}

fn default_topology() -> String {
    "ieee14".to_owned()
}

fn default_neighbor_limit() -> usize {
    2
}

fn default_detection_delay_min() -> Duration {
    Duration::from_millis(500)
}

fn default_detection_delay_max() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_sessions() -> usize {
    64
}

/// Primary configuration object for the SG-IDS runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "SG_IDS_CONFIG";

    /// Load configuration from disk, respecting the `SG_IDS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    ///
    /// Falls back to [`AppConfig::default`] when neither the environment
    /// override nor any candidate exists.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        if self.api.enabled && self.metrics.enabled && self.api.listen == self.metrics.listen {
            return Err(anyhow!(
                "api and metrics listeners must differ (both set to {})",
                self.api.listen
            ));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

/// Tunables for the attack-injection lab.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Base seed; each session derives its own stream from it.
    #[serde(default = "default_simulation_seed")]
    pub random_seed: u64,
    /// Topology used when a start request does not name one.
    #[serde(default = "default_topology")]
    pub default_topology: String,
    /// Maximum number of direct neighbours affected alongside the target.
    #[serde(default = "default_neighbor_limit")]
    pub neighbor_limit: usize,
    #[serde(default = "default_detection_delay_min")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub detection_delay_min: Duration,
    #[serde(default = "default_detection_delay_max")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub detection_delay_max: Duration,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            random_seed: default_simulation_seed(),
            default_topology: default_topology(),
            neighbor_limit: default_neighbor_limit(),
            detection_delay_min: default_detection_delay_min(),
            detection_delay_max: default_detection_delay_max(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.detection_delay_min >= self.detection_delay_max {
            return Err(anyhow!(
                "simulation detection_delay_min ({} ms) must be below detection_delay_max ({} ms)",
                self.detection_delay_min.as_millis(),
                self.detection_delay_max.as_millis()
            ));
        }
        if self.max_sessions == 0 {
            return Err(anyhow!("simulation max_sessions must be at least 1"));
        }
        if self.default_topology.trim().is_empty() {
            return Err(anyhow!("simulation default_topology must not be empty"));
        }
        Ok(())
    }
}
