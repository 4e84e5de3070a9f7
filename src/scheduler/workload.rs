use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Pending,
    Running,
    Stopped,
    Failed,
    Recovering,
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadStatus::Pending => write!(f, "pending"),
            WorkloadStatus::Running => write!(f, "running"),
            WorkloadStatus::Stopped => write!(f, "stopped"),
            WorkloadStatus::Failed => write!(f, "failed"),
            WorkloadStatus::Recovering => write!(f, "recovering"),
        }
    }
}

/// A submitted workload and its current binding.
///
/// The script path is opaque to the scheduler; only the agent interprets
/// it. `node` and `pid` are set while the workload is placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub id: String,
    pub script_path: String,
    pub submitted_at: DateTime<Utc>,
    pub status: WorkloadStatus,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub pid: Option<i32>,
    #[serde(default)]
    pub retry_count: u32,
}

impl Workload {
    pub fn new(id: String, script_path: String) -> Self {
        Self {
            id,
            script_path,
            submitted_at: Utc::now(),
            status: WorkloadStatus::Pending,
            node: None,
            pid: None,
            retry_count: 0,
        }
    }
}

/// Build a `workload_<unix_seconds>_<counter>` identifier.
pub fn workload_id(counter: u64) -> String {
    format!("workload_{}_{}", Utc::now().timestamp(), counter)
}
