use std::path::PathBuf;
use std::time::Duration;

/// Node Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// TCP port the agent's HTTP surface listens on.
    pub port: u16,
    /// How often the reaper scans the process table.
    pub reap_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL when stopping a process.
    pub stop_grace_period: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            reap_interval: Duration::from_secs(5),
            stop_grace_period: Duration::from_millis(500),
        }
    }
}

impl AgentConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub host: String,
    pub port: u16,
    pub state_file_path: PathBuf,
    /// Period of the health-probe loop.
    pub health_check_interval: Duration,
    /// Per-probe timeout; shorter than the start/stop RPC timeout.
    pub health_check_timeout: Duration,
    /// Consecutive failed probes before a node is marked offline.
    pub failure_threshold: u32,
    /// Placement attempts before a workload is terminally failed.
    pub max_retries: u32,
    /// Period of the recovery loop.
    pub recovery_period: Duration,
    /// Period of the state-persistence loop.
    pub state_save_period: Duration,
    /// Nodes at or above this CPU% are not placement candidates.
    pub cpu_placement_ceiling: f64,
    /// Timeout for start/stop RPCs to agents.
    pub rpc_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            state_file_path: PathBuf::from("orchestrator_state.json"),
            health_check_interval: Duration::from_secs(3),
            health_check_timeout: Duration::from_secs(2),
            failure_threshold: 2,
            max_retries: 3,
            recovery_period: Duration::from_secs(1),
            state_save_period: Duration::from_secs(30),
            cpu_placement_ceiling: 80.0,
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

impl SchedulerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file_path = path.into();
        self
    }
}
