use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::agent::metrics::MetricsSampler;
use crate::agent::process::{ProcessRecord, ProcessSupervisor};
use crate::error::OrchestratorError;

#[derive(Clone)]
pub struct AgentState {
    pub supervisor: Arc<ProcessSupervisor>,
    pub sampler: Arc<MetricsSampler>,
}

#[derive(Serialize)]
struct StatusResponse {
    cpu_usage: f64,
    memory_usage: f64,
    total_memory: u64,
    available_memory: u64,
    running_processes: usize,
    processes: Vec<ProcessRecord>,
}

#[derive(Deserialize)]
struct StartRequest {
    script_path: String,
}

#[derive(Deserialize)]
struct StopRequest {
    pid: PidField,
}

/// The stop endpoint accepts the pid as a JSON number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PidField {
    Number(i64),
    Text(String),
}

impl PidField {
    fn parse(&self) -> Option<i32> {
        match self {
            PidField::Number(n) => i32::try_from(*n).ok(),
            PidField::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub fn router(state: AgentState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/start", post(start_handler))
        .route("/stop", post(stop_handler))
        .fallback(unknown_route)
        .layer(cors)
        .with_state(state)
}

pub async fn status_handler(State(state): State<AgentState>) -> (StatusCode, Json<Value>) {
    let metrics = state.sampler.sample();
    let processes = state.supervisor.list().await;
    let response = StatusResponse {
        cpu_usage: metrics.cpu_usage,
        memory_usage: metrics.memory_usage,
        total_memory: metrics.total_memory,
        available_memory: metrics.available_memory,
        running_processes: processes.len(),
        processes,
    };
    (StatusCode::OK, Json(json!(response)))
}

pub async fn start_handler(
    State(state): State<AgentState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing script_path field");
    };

    match state.supervisor.start(&request.script_path).await {
        Ok(pid) => (StatusCode::OK, Json(json!({"pid": pid, "status": "started"}))),
        Err(OrchestratorError::InvalidRequest(msg)) => {
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start process");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to start process: {e}"),
            )
        }
    }
}

pub async fn stop_handler(
    State(state): State<AgentState>,
    body: Result<Json<StopRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing pid field");
    };
    let Some(pid) = request.pid.parse() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid pid format");
    };

    match state.supervisor.stop(pid).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "stopped"}))),
        Err(OrchestratorError::ProcessNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, &format!("Process not found: {pid}"))
        }
        Err(e) => {
            tracing::error!(pid, error = %e, "Failed to stop process");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to stop process: {e}"),
            )
        }
    }
}

pub async fn unknown_route() -> (StatusCode, Json<Value>) {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": message})))
}
