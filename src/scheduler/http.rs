use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::error::OrchestratorError;
use crate::scheduler::node::{NodeInfo, NodeStatus};
use crate::scheduler::workload::WorkloadStatus;
use crate::scheduler::Scheduler;

#[derive(Deserialize)]
struct RegisterNodeRequest {
    host: String,
    port: u16,
}

#[derive(Deserialize)]
struct SubmitWorkloadRequest {
    script_path: String,
}

#[derive(Serialize)]
struct HealthSummary {
    total_nodes: usize,
    online_nodes: usize,
    offline_nodes: usize,
    degraded_nodes: usize,
    failed_workloads: usize,
    desired_workloads: usize,
    node_details: Vec<NodeDetail>,
}

#[derive(Serialize)]
struct NodeDetail {
    node_key: String,
    host: String,
    port: u16,
    status: String,
    cpu_usage: f64,
    memory_usage: f64,
    last_check: Option<String>,
    consecutive_failures: u32,
    response_time: Option<f64>,
}

impl NodeDetail {
    fn from_node(node: &NodeInfo) -> Self {
        Self {
            node_key: node.key(),
            host: node.host.clone(),
            port: node.port,
            status: node.status.to_string(),
            cpu_usage: node.cpu_usage,
            memory_usage: node.memory_usage,
            last_check: node.last_probe.map(|t| t.to_rfc3339()),
            consecutive_failures: node.consecutive_failures,
            response_time: node.response_time,
        }
    }
}

fn build_summary(nodes: &[NodeInfo], failed: &[String], desired_count: usize) -> HealthSummary {
    let mut online = 0;
    let mut offline = 0;
    let mut degraded = 0;
    for node in nodes {
        match node.status {
            NodeStatus::Online => online += 1,
            NodeStatus::Offline => offline += 1,
            _ => degraded += 1,
        }
    }
    HealthSummary {
        total_nodes: nodes.len(),
        online_nodes: online,
        offline_nodes: offline,
        degraded_nodes: degraded,
        failed_workloads: failed.len(),
        desired_workloads: desired_count,
        node_details: nodes.iter().map(NodeDetail::from_node).collect(),
    }
}

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/summary", get(health_summary_handler))
        .route("/health/check", post(force_health_check_handler))
        .route("/recovery/metrics", get(recovery_metrics_handler))
        .route("/nodes", get(list_nodes_handler).post(register_node_handler))
        .route(
            "/workloads",
            get(list_workloads_handler).post(submit_workload_handler),
        )
        .route("/workloads/{id}", delete(stop_workload_handler))
        .fallback(unknown_route)
        .layer(cors)
        .with_state(scheduler)
}

pub async fn health_handler(State(scheduler): State<Arc<Scheduler>>) -> (StatusCode, Json<Value>) {
    let (nodes, workloads) = scheduler.counts().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
            "nodes": nodes,
            "workloads": workloads,
        })),
    )
}

pub async fn health_summary_handler(
    State(scheduler): State<Arc<Scheduler>>,
) -> (StatusCode, Json<Value>) {
    let (nodes, failed, desired) = scheduler.summary().await;
    (
        StatusCode::OK,
        Json(json!(build_summary(&nodes, &failed, desired))),
    )
}

/// Force an immediate probe round and report the resulting summary.
pub async fn force_health_check_handler(
    State(scheduler): State<Arc<Scheduler>>,
) -> (StatusCode, Json<Value>) {
    scheduler.run_health_check().await;
    let (nodes, failed, desired) = scheduler.summary().await;
    (
        StatusCode::OK,
        Json(json!(build_summary(&nodes, &failed, desired))),
    )
}

pub async fn recovery_metrics_handler(
    State(scheduler): State<Arc<Scheduler>>,
) -> (StatusCode, Json<Value>) {
    let (nodes, failed, desired) = scheduler.summary().await;
    let health_checks: BTreeMap<String, Value> = nodes
        .iter()
        .map(|node| {
            (
                node.key(),
                json!({
                    "last_check": node.last_probe.map(|t| t.to_rfc3339()),
                    "consecutive_failures": node.consecutive_failures,
                    "response_time": node.response_time,
                    "status": node.status.to_string(),
                }),
            )
        })
        .collect();
    (
        StatusCode::OK,
        Json(json!({
            "failed_workloads": failed,
            "desired_state_count": desired,
            "health_checks": health_checks,
        })),
    )
}

pub async fn list_nodes_handler(
    State(scheduler): State<Arc<Scheduler>>,
) -> (StatusCode, Json<Value>) {
    let nodes = scheduler.list_nodes().await;
    (StatusCode::OK, Json(json!(nodes)))
}

pub async fn register_node_handler(
    State(scheduler): State<Arc<Scheduler>>,
    body: Result<Json<RegisterNodeRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing host or port");
    };
    let key = scheduler.register_node(&request.host, request.port).await;
    (
        StatusCode::OK,
        Json(json!({"message": format!("Node {key} registered")})),
    )
}

pub async fn list_workloads_handler(
    State(scheduler): State<Arc<Scheduler>>,
) -> (StatusCode, Json<Value>) {
    let workloads = scheduler.list_workloads().await;
    (StatusCode::OK, Json(json!(workloads)))
}

pub async fn submit_workload_handler(
    State(scheduler): State<Arc<Scheduler>>,
    body: Result<Json<SubmitWorkloadRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(request)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing script_path");
    };

    match scheduler.submit_workload(&request.script_path).await {
        Ok(workload) if workload.status == WorkloadStatus::Running => (
            StatusCode::OK,
            Json(json!({
                "workload_id": workload.id,
                "node": workload.node,
                "status": "started",
            })),
        ),
        // Accepted but unplaced; the recovery loop keeps trying.
        Ok(workload) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "workload_id": workload.id,
                "status": "pending",
            })),
        ),
        Err(OrchestratorError::InvalidRequest(msg)) => {
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
        Err(e) => {
            tracing::error!(error = %e, "Workload submission failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{e}"))
        }
    }
}

pub async fn stop_workload_handler(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match scheduler.stop_workload(&id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"message": format!("Workload {id} stopped")})),
        ),
        Err(OrchestratorError::WorkloadNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Workload not found")
        }
        Err(e) => {
            tracing::error!(workload = %id, error = %e, "Stop failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{e}"))
        }
    }
}

pub async fn unknown_route() -> (StatusCode, Json<Value>) {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": message})))
}
