use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::{OrchestratorError, Result};

/// Status snapshot returned by an agent's `/status` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentStatus {
    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub memory_usage: f64,
    #[serde(default)]
    pub total_memory: u64,
    #[serde(default)]
    pub available_memory: u64,
    #[serde(default)]
    pub running_processes: usize,
}

#[derive(Deserialize)]
struct StartResponse {
    pid: i32,
}

/// HTTP client for the Node Agent wire contract.
///
/// Probes use the short health-check timeout; start/stop RPCs use the
/// larger RPC timeout.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    probe_timeout: Duration,
    rpc_timeout: Duration,
}

impl AgentClient {
    pub fn new(probe_timeout: Duration, rpc_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            probe_timeout,
            rpc_timeout,
        })
    }

    /// Probe an agent's `/status`.
    pub async fn probe(&self, host: &str, port: u16) -> Result<AgentStatus> {
        let url = format!("http://{host}:{port}/status");
        let response = self
            .http
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::NodeUnavailable(format!(
                "{host}:{port} returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// Ask an agent to start `script_path`; returns the remote pid.
    pub async fn start_workload(&self, host: &str, port: u16, script_path: &str) -> Result<i32> {
        let url = format!("http://{host}:{port}/start");
        let response = self
            .http
            .post(&url)
            .json(&json!({"script_path": script_path}))
            .timeout(self.rpc_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::NodeUnavailable(format!(
                "{host}:{port} returned {}",
                response.status()
            )));
        }
        let body: StartResponse = response.json().await?;
        Ok(body.pid)
    }

    /// Ask an agent to stop a remote pid.
    pub async fn stop_workload(&self, host: &str, port: u16, pid: i32) -> Result<()> {
        let url = format!("http://{host}:{port}/stop");
        let response = self
            .http
            .post(&url)
            .json(&json!({"pid": pid}))
            .timeout(self.rpc_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OrchestratorError::NodeUnavailable(format!(
                "{host}:{port} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
