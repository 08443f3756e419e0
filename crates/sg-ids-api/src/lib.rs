//! ---
//! ids_section: "05-networking-external-interfaces"
//! ids_subsection: "module"
//! ids_type: "source"
//! ids_scope: "code"
//! ids_description: "HTTP surface for creating and driving simulation sessions."
//! ids_version: "v0.1.0"
//! ids_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sg_ids_sim::{
    AttackType, LoadProfile, Observability, SessionManager, SessionSummary, SessionView, SimError,
    StartConfig, TopologyId,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared API state exposed to handlers.
pub struct ApiState {
    start: Instant,
    manager: Arc<SessionManager>,
}

impl ApiState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            start: Instant::now(),
            manager,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok",
            uptime_seconds: self.start.elapsed().as_secs(),
            sessions: self.manager.len(),
        }
    }

    /// Resolve an optional start request against the manager defaults.
    fn start_config(&self, request: Option<StartRequest>) -> Result<StartConfig, SimError> {
        let request = request.unwrap_or_default();
        let topology = match request.topology {
            Some(raw) => raw.parse::<TopologyId>()?,
            None => self.manager.default_topology(),
        };
        Ok(StartConfig {
            topology,
            load_profile: request.load_profile.unwrap_or_default(),
            observability: request.observability.unwrap_or_default(),
        })
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("sessions", &self.manager.len())
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the session control routes.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/start", post(start_session))
        .route("/api/sessions/:id/stop", post(stop_session))
        .route("/api/sessions/:id/attack", post(inject_attack))
        .route("/api/sessions/:id/clear", post(clear_attacks))
        .route(
            "/api/sessions/:id/mitigations/:index/ack",
            post(acknowledge_mitigation),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the REST API on `addr`. Port 0 binds an ephemeral port; see [`ApiServer::addr`].
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let app = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let bound = listener
        .local_addr()
        .context("failed to resolve API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %bound, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
    sessions: usize,
}

#[derive(Debug, Default, Deserialize)]
struct StartRequest {
    #[serde(default)]
    topology: Option<String>,
    #[serde(default)]
    load_profile: Option<LoadProfile>,
    #[serde(default)]
    observability: Option<Observability>,
}

#[derive(Debug, Deserialize)]
struct AttackRequest {
    target_node_id: String,
    attack_type: String,
}

#[derive(Debug, Serialize)]
struct AttackResponse {
    affected_node_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        let status = match &err {
            SimError::UnknownSession(_) | SimError::UnknownMitigation { .. } => {
                StatusCode::NOT_FOUND
            }
            SimError::InvalidTopology(_) | SimError::InvalidAttackType(_) => {
                StatusCode::BAD_REQUEST
            }
            SimError::InvalidTarget(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SimError::InvalidState { .. } => StatusCode::CONFLICT,
            SimError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
            SimError::StaleResolution { .. } | SimError::Topology(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            warn!(code = err.code(), error = %err, "session request failed");
        }
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl ApiError {
    /// Map a start body rejection. A request without a JSON content type
    /// carries no body and starts with the defaults.
    fn start_body(
        request: std::result::Result<Json<StartRequest>, JsonRejection>,
    ) -> ApiResult<Option<StartRequest>> {
        match request {
            Ok(Json(body)) => Ok(Some(body)),
            Err(JsonRejection::MissingJsonContentType(_)) => Ok(None),
            Err(rejection) => Err(Self {
                status: StatusCode::BAD_REQUEST,
                code: "invalid_request",
                message: rejection.body_text(),
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            code: self.code,
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn get_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(state.health())
}

async fn list_sessions(State(state): State<Arc<ApiState>>) -> Json<Vec<SessionSummary>> {
    Json(state.manager.list_sessions())
}

async fn create_session(
    State(state): State<Arc<ApiState>>,
    request: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let config = state.start_config(ApiError::start_body(request)?)?;
    let id = state.manager.create_session()?;
    let view = state.manager.start(id, config)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.manager.view(id)?))
}

async fn delete_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.manager.remove_session(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    request: std::result::Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<Json<SessionView>> {
    let config = state.start_config(ApiError::start_body(request)?)?;
    Ok(Json(state.manager.start(id, config)?))
}

async fn stop_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.manager.stop(id)?))
}

async fn inject_attack(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AttackRequest>,
) -> ApiResult<(StatusCode, Json<AttackResponse>)> {
    let attack: AttackType = request.attack_type.parse()?;
    let affected_node_ids = state
        .manager
        .inject_attack(id, &request.target_node_id, attack)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AttackResponse { affected_node_ids }),
    ))
}

async fn clear_attacks(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.manager.clear_attacks(id)?))
}

async fn acknowledge_mitigation(
    State(state): State<Arc<ApiState>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(state.manager.acknowledge_mitigation(id, index)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_ids_sim::SessionPhase;

    #[test]
    fn sim_errors_map_to_http_statuses() {
        let cases = [
            (SimError::UnknownSession(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                SimError::UnknownMitigation {
                    index: 9,
                    available: 4,
                },
                StatusCode::NOT_FOUND,
            ),
            (SimError::InvalidTopology("x".into()), StatusCode::BAD_REQUEST),
            (SimError::InvalidAttackType("x".into()), StatusCode::BAD_REQUEST),
            (
                SimError::InvalidTarget("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SimError::InvalidState {
                    operation: "stop",
                    phase: SessionPhase::Idle,
                },
                StatusCode::CONFLICT,
            ),
            (
                SimError::CapacityExceeded(1),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            let code = err.code();
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }
}
