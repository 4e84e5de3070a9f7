use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(i32),

    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
