use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health state of a registered node.
///
/// Mutated exclusively by the health monitor; a node is `Offline` only
/// once its consecutive-failure counter has crossed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Degraded,
    Offline,
    Unknown,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Degraded => write!(f, "degraded"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A registered Node Agent, identified by its `host:port` pair.
///
/// Nodes are created on first registration and never deleted; an
/// unreachable node simply stays in the registry as `Offline`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub total_memory: u64,
    pub available_memory: u64,
    pub running_processes: usize,
    pub last_probe: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Round-trip time of the last successful probe, in seconds.
    pub response_time: Option<f64>,
    /// Position in registration order; placement tie-breaker.
    #[serde(skip)]
    pub registration_order: u64,
}

impl NodeInfo {
    pub fn new(host: impl Into<String>, port: u16, registration_order: u64) -> Self {
        Self {
            host: host.into(),
            port,
            status: NodeStatus::Unknown,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            total_memory: 0,
            available_memory: 0,
            running_processes: 0,
            last_probe: None,
            consecutive_failures: 0,
            response_time: None,
            registration_order,
        }
    }

    pub fn key(&self) -> String {
        node_key(&self.host, self.port)
    }

    /// Re-registration resets the node to `Unknown` for re-probing;
    /// the registration order is kept.
    pub fn reset(&mut self) {
        self.status = NodeStatus::Unknown;
        self.consecutive_failures = 0;
        self.last_probe = None;
        self.response_time = None;
    }
}

pub fn node_key(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}
