//! ---
//! ids_section: "03-observability"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "Prometheus registry, scrape endpoint and daemon process metrics."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use prometheus;

/// Registry shared between the exporter and every instrumented component.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every family in `registry` in the Prometheus text exposition format.
pub fn encode_registry(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metric families")
}

/// Serve `registry` at `/metrics` on `addr`. Port 0 binds an ephemeral port.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new()
        .route("/metrics", get(scrape))
        .with_state(registry);

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .context("failed to resolve metrics listener address")?;
    let listener =
        TcpListener::from_std(std_listener).context("failed to create tokio metrics listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound, "metrics exporter listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics exporter terminated with an error")
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn scrape(State(registry): State<SharedRegistry>) -> Response {
    match encode_registry(&registry) {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Handle to the running exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for in-flight requests to drain.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .context("metrics exporter task panicked")?
    }
}

/// Process-level metrics recorded once by the daemon during startup.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: IntGaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::new(
            "sg_idsd_starts_total",
            "Times the SG-IDS daemon has initialised",
        )?;
        registry.register(Box::new(starts_total.clone()))?;

        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sg_idsd_config_load_seconds",
                "Time spent locating, parsing and validating configuration",
            )
            .buckets(prometheus::exponential_buckets(0.0005, 2.0, 12)?),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = IntGaugeVec::new(
            Opts::new(
                "sg_idsd_build_info",
                "Constant 1, labelled with the running build and its configuration source",
            ),
            &["version", "profile", "config_source"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, elapsed: Duration) {
        self.config_load_seconds.observe(elapsed.as_secs_f64());
    }

    /// `config_source` is `file` or `defaults`.
    pub fn set_build_info(&self, version: &str, profile: &str, config_source: &str) {
        self.build_info
            .with_label_values(&[version, profile, config_source])
            .set(1);
    }
}

impl std::fmt::Debug for DaemonMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_families_are_encoded() {
        let metrics = DaemonMetrics::new(new_registry()).unwrap();
        metrics.inc_start();
        metrics.observe_config_load(Duration::from_millis(3));
        metrics.set_build_info("0.1.0", "debug", "defaults");

        let text = encode_registry(&metrics.registry()).unwrap();
        assert!(text.contains("sg_idsd_starts_total 1"));
        assert!(text.contains("sg_idsd_config_load_seconds_count 1"));
        assert!(text.contains(
            r#"sg_idsd_build_info{config_source="defaults",profile="debug",version="0.1.0"} 1"#
        ));
    }

    #[test]
    fn double_registration_is_an_error() {
        let registry = new_registry();
        DaemonMetrics::new(registry.clone()).unwrap();
        assert!(DaemonMetrics::new(registry).is_err());
    }

    #[test]
    fn empty_registry_encodes_to_empty_text() {
        assert!(encode_registry(&new_registry()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn exporter_serves_text_format() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.inc_start();

        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap()).unwrap();
        let response = reqwest::get(format!("http://{}/metrics", server.addr()))
            .await
            .unwrap();
        assert!(response.status().is_success());
        let content_type = response.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_owned();
        assert!(content_type.starts_with("text/plain"));
        let body = response.text().await.unwrap();
        assert!(body.contains("sg_idsd_starts_total 1"));
        server.shutdown().await.unwrap();
    }
}
