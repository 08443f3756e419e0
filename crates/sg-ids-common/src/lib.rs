//! ---
//! ids_section: "01-core-functionality"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Shared configuration and logging primitives."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
//! Shared configuration and logging primitives for the SG-IDS workspace.

pub mod config;
pub mod logging;

pub use config::{AppConfig, ApiConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, SimulationConfig};
pub use logging::{init_tracing, LogFormat};
