//! Agent RPC surface
//!
//! HTTP/JSON endpoints through which the control plane asks this host to
//! program a deployable, plus read-only views of programming activity.

use accel_domain::Uuid;
use accel_drivers::DriverError;
use accel_lifecycle::{ProgrammingError, ProgrammingEvent, ProgrammingStats};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::manager::AgentManager;
use crate::AgentError;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AgentManager>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramRequest {
    pub firmware_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAccepted {
    pub deployable_uuid: Uuid,
    pub firmware_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

impl AgentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentError::DeployableNotFound(_) | AgentError::HostNotFound => StatusCode::NOT_FOUND,
            AgentError::Programming(e) => match e {
                ProgrammingError::InvalidFirmwareId(_) => StatusCode::BAD_REQUEST,
                ProgrammingError::AlreadyInProgress(_) => StatusCode::CONFLICT,
                ProgrammingError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                ProgrammingError::Driver(DriverError::NoDriver { .. }) => StatusCode::NOT_FOUND,
                ProgrammingError::Driver(DriverError::NotImplemented(_)) => {
                    StatusCode::NOT_IMPLEMENTED
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            AgentError::Catalog(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "accel-agent",
        "host": state.manager.config().host,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn program_handler(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(request): Json<ProgramRequest>,
) -> Result<impl IntoResponse, AgentError> {
    info!(uuid = %uuid, firmware = %request.firmware_id, "Program request received");
    let task = state
        .manager
        .program_device(uuid, &request.firmware_id)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ProgramAccepted {
            deployable_uuid: task.deployable_uuid,
            firmware_id: task.firmware_id,
            status: "accepted".to_string(),
        }),
    ))
}

async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<ProgrammingEvent>> {
    Json(state.manager.controller().events(query.limit).await)
}

async fn stats_handler(State(state): State<AppState>) -> Json<ProgrammingStats> {
    Json(state.manager.controller().stats().await)
}

pub fn router(manager: Arc<AgentManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/deployables/:uuid/program", post(program_handler))
        .route("/api/v1/programming/events", get(events_handler))
        .route("/api/v1/programming/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager })
}
