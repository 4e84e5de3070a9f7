use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Exited,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited => write!(f, "exited"),
        }
    }
}

/// A child process tracked by the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: i32,
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub status: ProcessStatus,
}

/// Per-host supervisor owning the children it has spawned.
///
/// The kernel parent-child relationship is the source of truth; the table
/// is a flat map keyed by pid. A single mutex guards it, and every
/// mutation (start, stop, reap, list) takes that lock.
pub struct ProcessSupervisor {
    table: Mutex<HashMap<i32, ProcessRecord>>,
    grace_period: Duration,
}

impl ProcessSupervisor {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            grace_period,
        }
    }

    /// Spawn `script_path` as a child process and record it.
    ///
    /// The path is handed to the kernel as-is: no canonicalization, no
    /// existence check, no shell. Two starts of the same path yield two
    /// independent records.
    pub async fn start(&self, script_path: &str) -> Result<i32> {
        if script_path.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "script_path must not be empty".to_string(),
            ));
        }

        let child = Command::new(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(OrchestratorError::SpawnFailed)?;

        let pid = child.id() as i32;
        let record = ProcessRecord {
            pid,
            command: script_path.to_string(),
            start_time: Utc::now(),
            status: ProcessStatus::Running,
        };
        self.table.lock().await.insert(pid, record);

        tracing::info!(pid, command = script_path, "Process started");
        Ok(pid)
    }

    /// Stop a tracked process: SIGTERM, bounded grace period, then SIGKILL
    /// if the child is still alive. Does not wait for the actual exit
    /// beyond the grace period; the reaper completes cleanup.
    pub async fn stop(&self, pid: i32) -> Result<()> {
        let mut table = self.table.lock().await;
        if !table.contains_key(&pid) {
            return Err(OrchestratorError::ProcessNotFound(pid));
        }

        let target = Pid::from_raw(pid);
        kill(target, Signal::SIGTERM).map_err(|e| {
            OrchestratorError::Internal(format!("SIGTERM failed for pid {pid}: {e}"))
        })?;

        tokio::time::sleep(self.grace_period).await;

        // Unconditional kill if the graceful signal was not enough.
        if kill(target, None::<Signal>).is_ok() {
            let _ = kill(target, Signal::SIGKILL);
        }

        table.remove(&pid);
        tracing::info!(pid, "Process stopped");
        Ok(())
    }

    /// Snapshot of the process table, sorted by pid.
    pub async fn list(&self) -> Vec<ProcessRecord> {
        let table = self.table.lock().await;
        let mut records: Vec<ProcessRecord> = table.values().cloned().collect();
        records.sort_by_key(|r| r.pid);
        records
    }

    /// Drop records whose pid no longer corresponds to a live process.
    ///
    /// Exited children are collected with `waitpid` first so the
    /// zero-signal probe sees a dead pid instead of an unreaped zombie.
    /// Returns the number of records purged.
    pub async fn reap(&self) -> usize {
        let mut table = self.table.lock().await;
        collect_zombies();
        let before = table.len();
        table.retain(|pid, _| kill(Pid::from_raw(*pid), None::<Signal>).is_ok());
        let purged = before - table.len();
        if purged > 0 {
            tracing::debug!(purged, "Purged dead process records");
        }
        purged
    }

    /// Run the reaper until the shutdown token fires.
    pub async fn run_reaper(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reap().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }
}

/// Reap any exited children without blocking.
fn collect_zombies() {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, code)) => {
                tracing::debug!(pid = pid.as_raw(), code, "Child exited");
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                tracing::debug!(pid = pid.as_raw(), signal = ?sig, "Child killed by signal");
            }
            Ok(WaitStatus::StillAlive) => break,
            Err(Errno::ECHILD) => break,
            Err(e) => {
                tracing::warn!(error = %e, "waitpid failed");
                break;
            }
            _ => {}
        }
    }
}
