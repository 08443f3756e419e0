//! ---
//! ids_section: "01-core-functionality"
//! ids_subsection: "binary"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Binary entrypoint for the SG-IDS daemon."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sg_ids_api::{spawn_api_server, ApiServer, ApiState};
use sg_ids_common::config::AppConfig;
use sg_ids_common::logging::init_tracing;
use sg_ids_metrics::{new_registry, spawn_http_server, DaemonMetrics, SharedRegistry};
use sg_ids_sim::{AttackType, SessionManager, SimulationMetrics, StartConfig, TopologyId};
use tokio::signal;
use tracing::{info, warn};

/// Extra time granted on top of the longest configured detection delay.
const SCENARIO_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("SG-IDS ", env!("CARGO_PKG_VERSION")),
    about = "Smart-grid intrusion detection simulation lab",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the session API and metrics exporter until interrupted")]
    Run,
    #[command(about = "Run one attack scenario in-process and print the final session state")]
    Scenario {
        #[arg(long, help = "Topology preset (ieee14, ieee30, ieee57)")]
        topology: Option<String>,
        #[arg(long, default_value = "bus6", help = "Node id to attack")]
        target: String,
        #[arg(long, default_value = "FDI", help = "Attack type tag or name")]
        attack: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/sg-ids.toml"));

    let load_started = Instant::now();
    let loaded_config = AppConfig::load_with_source(&candidates)?;
    let config = loaded_config.config;
    let load_duration = load_started.elapsed();

    let metrics_registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(metrics_registry.clone())?;
    let config_source = if loaded_config.source.is_some() {
        "file"
    } else {
        "defaults"
    };
    daemon_metrics.observe_config_load(load_duration);
    daemon_metrics.inc_start();
    daemon_metrics.set_build_info(env!("CARGO_PKG_VERSION"), build_profile(), config_source);

    init_tracing("sg-idsd", &config.logging)?;
    match &loaded_config.source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; using built-in defaults"),
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, metrics_registry).await?,
        Commands::Scenario {
            topology,
            target,
            attack,
        } => run_scenario(config, topology, &target, &attack, metrics_registry).await?,
    }

    Ok(())
}

async fn run_daemon(config: AppConfig, metrics_registry: SharedRegistry) -> Result<()> {
    let simulation_metrics = SimulationMetrics::new(metrics_registry.clone())?;
    let manager = Arc::new(
        SessionManager::new(&config.simulation)
            .context("invalid simulation configuration")?
            .with_metrics(simulation_metrics),
    );

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(metrics_registry, config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let api_server: Option<ApiServer> = if config.api.enabled {
        let state = Arc::new(ApiState::new(Arc::clone(&manager)));
        let server = spawn_api_server(state, config.api.listen)
            .context("failed to start api server")?;
        info!(address = %server.addr(), "api server listening");
        Some(server)
    } else {
        info!("api server disabled by configuration");
        None
    };

    info!(
        default_topology = %manager.default_topology(),
        "daemon running; waiting for termination signal"
    );
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    Ok(())
}

async fn run_scenario(
    config: AppConfig,
    topology: Option<String>,
    target: &str,
    attack: &str,
    metrics_registry: SharedRegistry,
) -> Result<()> {
    let attack: AttackType = attack.parse()?;
    let manager = SessionManager::new(&config.simulation)
        .context("invalid simulation configuration")?
        .with_metrics(SimulationMetrics::new(metrics_registry)?);
    let topology = match topology {
        Some(raw) => raw.parse::<TopologyId>()?,
        None => manager.default_topology(),
    };

    let id = manager.create_session()?;
    manager.start(id, StartConfig::new(topology))?;
    let affected = manager.inject_attack(id, target, attack)?;
    info!(session_id = %id, affected = ?affected, "scenario attack injected");

    let timeout = config.simulation.detection_delay_max + SCENARIO_GRACE;
    match manager.await_detection(id, timeout).await? {
        Some(result) => info!(
            session_id = %id,
            confidence = result.confidence_score,
            "scenario detection published"
        ),
        None => warn!(session_id = %id, "scenario detection did not resolve in time"),
    }

    let view = manager.view(id)?;
    let rendered =
        serde_json::to_string_pretty(&view).context("failed to render session state")?;
    println!("{rendered}");
    Ok(())
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn daemon_fails_when_api_port_is_taken() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = AppConfig::default();
        config.metrics.enabled = false;
        config.api.listen = occupied.local_addr().unwrap();

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), run_daemon(config, new_registry())).await;
        let err = outcome
            .expect("daemon should exit instead of waiting for ctrl-c")
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to start api server"));
    }
}
