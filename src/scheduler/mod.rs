//! Scheduler: placement, health monitoring, and automated recovery.
//!
//! The scheduler is a singleton that tracks a registry of node agents, a
//! table of accepted workloads, and the desired placement mapping each
//! workload to a node. Three background loops cooperate over one coarse
//! lock:
//!
//! 1. **Health monitor**: probes every node each period and drives the
//!    per-node status state machine; crossing the failure threshold moves
//!    the node's workloads into the failed set.
//! 2. **Recovery engine**: re-places failed and pending workloads onto
//!    healthy nodes with a bounded retry budget.
//! 3. **State persister**: snapshots the workload table and desired
//!    placement to disk so a restart can resume where it left off.
//!
//! Loops never propagate errors; they log and continue on the next tick.

pub mod client;
pub mod health;
pub mod http;
pub mod node;
pub mod persist;
pub mod placement;
pub mod state;
pub mod workload;

pub use node::{NodeInfo, NodeStatus};
pub use state::{PlacementEntry, SchedulerState};
pub use workload::{Workload, WorkloadStatus};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::{OrchestratorError, Result};

use client::AgentClient;
use health::HealthEvent;

/// The singleton scheduler service.
///
/// All mutable state lives behind one `Mutex`; the health monitor
/// appends failure events under that lock, so a subsequent recovery tick
/// always observes the resulting failed-set membership.
pub struct Scheduler {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    client: AgentClient,
}

impl Scheduler {
    /// Create a scheduler, seeding state from the state file if present.
    /// Loaded workloads are not re-placed; drift is detected by the
    /// normal probe and recovery paths.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let persisted = persist::load_state(&config.state_file_path)?;
        let state = SchedulerState::from_persisted(persisted);
        let loaded = state.workload_count();
        if loaded > 0 {
            tracing::info!(
                workloads = loaded,
                path = %config.state_file_path.display(),
                "Loaded persisted state"
            );
        }
        let client = AgentClient::new(config.health_check_timeout, config.rpc_timeout)?;
        Ok(Self {
            config,
            state: Mutex::new(state),
            client,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ---- registry ----

    pub async fn register_node(&self, host: &str, port: u16) -> String {
        let key = self.state.lock().await.register_node(host, port);
        tracing::info!(node = %key, "Node registered");
        key
    }

    pub async fn list_nodes(&self) -> Vec<NodeInfo> {
        self.state.lock().await.nodes()
    }

    // ---- workloads ----

    /// Accept a workload and attempt to place it immediately.
    ///
    /// With no placement candidate (or a failed start RPC) the workload
    /// is held `Pending` and the recovery loop keeps trying.
    pub async fn submit_workload(&self, script_path: &str) -> Result<Workload> {
        if script_path.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "script_path must not be empty".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let workload = state.new_workload(script_path);
        let id = workload.id.clone();

        let target = placement::select_node(
            state.nodes_iter(),
            self.config.cpu_placement_ceiling,
            None,
        )
        .map(|n| (n.host.clone(), n.port));

        let Some((host, port)) = target else {
            tracing::info!(workload = %id, "No placement candidate, holding workload pending");
            return Ok(workload);
        };

        match self.client.start_workload(&host, port, script_path).await {
            Ok(pid) => {
                tracing::info!(workload = %id, node = %node::node_key(&host, port), pid, "Workload started");
                state
                    .bind(&id, &host, port, pid)
                    .ok_or(OrchestratorError::WorkloadNotFound(id))
            }
            Err(e) => {
                tracing::warn!(workload = %id, node = %node::node_key(&host, port), error = %e, "Start failed, holding workload pending");
                Ok(workload)
            }
        }
    }

    pub async fn list_workloads(&self) -> Vec<Workload> {
        self.state.lock().await.workloads()
    }

    /// Stop a workload: its desired entry and failed-set membership are
    /// dropped first, then a best-effort stop RPC goes to the bound node.
    /// An unreachable node does not un-stop the workload.
    pub async fn stop_workload(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some((_, entry)) = state.remove_workload(id) else {
            return Err(OrchestratorError::WorkloadNotFound(id.to_string()));
        };

        if let Some(entry) = entry {
            if let Err(e) = self
                .client
                .stop_workload(&entry.node_host, entry.node_port, entry.pid)
                .await
            {
                tracing::warn!(
                    workload = %id,
                    node = %entry.node_key(),
                    error = %e,
                    "Best-effort stop failed"
                );
            }
        }

        tracing::info!(workload = %id, "Workload stopped");
        Ok(())
    }

    // ---- introspection ----

    /// Node snapshot plus failed ids and desired count, under one lock.
    pub async fn summary(&self) -> (Vec<NodeInfo>, Vec<String>, usize) {
        let state = self.state.lock().await;
        (state.nodes(), state.failed_ids(), state.desired_count())
    }

    /// (node count, workload count) for the liveness endpoint.
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.node_count(), state.workload_count())
    }

    pub async fn failed_workload_ids(&self) -> Vec<String> {
        self.state.lock().await.failed_ids()
    }

    pub async fn desired_entries(&self) -> Vec<PlacementEntry> {
        self.state.lock().await.desired_entries()
    }

    // ---- health monitoring ----

    /// One probe round over every registered node.
    ///
    /// Probes run concurrently off-lock; outcomes are applied under the
    /// lock so failure events are visible to the next recovery tick.
    pub async fn run_health_check(&self) {
        let targets: Vec<(String, String, u16)> = {
            let state = self.state.lock().await;
            state
                .nodes_iter()
                .map(|n| (n.key(), n.host.clone(), n.port))
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        let probes = targets.into_iter().map(|(key, host, port)| {
            let client = self.client.clone();
            async move {
                let started = Instant::now();
                let outcome = client.probe(&host, port).await;
                (key, started.elapsed(), outcome)
            }
        });
        let outcomes = futures::future::join_all(probes).await;

        let mut state = self.state.lock().await;
        for (key, rtt, outcome) in outcomes {
            let event = match state.node_mut(&key) {
                Some(node) => match outcome {
                    Ok(status) => health::record_probe_success(node, &status, rtt),
                    Err(e) => {
                        tracing::debug!(node = %key, error = %e, "Probe failed");
                        health::record_probe_failure(node, self.config.failure_threshold)
                    }
                },
                None => continue,
            };

            match event {
                Some(HealthEvent::NodeFailed(node_key)) => {
                    let affected = state.mark_node_failed(&node_key);
                    tracing::warn!(
                        node = %node_key,
                        workloads = affected.len(),
                        "Node offline, workloads queued for recovery"
                    );
                }
                Some(HealthEvent::NodeRejoined(node_key)) => {
                    tracing::info!(node = %node_key, "Node back online");
                }
                None => {}
            }
        }
    }

    async fn run_health_monitor(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_health_check().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    // ---- recovery ----

    /// One recovery pass over the failed set plus never-placed pending
    /// workloads. Holds the scheduler lock across the whole
    /// (lookup, decide, RPC, update) sequence so a workload is never
    /// concurrently started on two nodes.
    pub async fn run_recovery_tick(&self) {
        let mut state = self.state.lock().await;

        // Retry counters are forgiven only for workloads that were
        // already running healthily when this tick started; a placement
        // made below keeps its count until a later tick.
        let settled = state.healthy_running_ids();

        let mut queue = state.failed_ids();
        queue.extend(state.pending_ids());

        for id in queue {
            let found = state
                .workload(&id)
                .map(|w| (w.retry_count, w.node.clone(), w.script_path.clone()));
            let Some((retry_count, exclude, script_path)) = found else {
                state.clear_failed(&id);
                continue;
            };

            if retry_count >= self.config.max_retries {
                tracing::error!(workload = %id, retries = retry_count, "Retry limit exceeded, workload failed");
                state.mark_workload_failed(&id);
                continue;
            }

            let target = placement::select_node(
                state.nodes_iter(),
                self.config.cpu_placement_ceiling,
                exclude.as_deref(),
            )
            .map(|n| (n.key(), n.host.clone(), n.port));

            let Some((key, host, port)) = target else {
                state.bump_retry(&id);
                continue;
            };

            match self.client.start_workload(&host, port, &script_path).await {
                Ok(pid) => {
                    state.bind(&id, &host, port, pid);
                    tracing::info!(workload = %id, node = %key, pid, "Workload placed");
                }
                Err(e) => {
                    tracing::warn!(workload = %id, node = %key, error = %e, "Placement failed");
                    state.bump_retry(&id);
                }
            }
        }

        state.reset_retries(&settled);
    }

    async fn run_recovery_engine(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.recovery_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_recovery_tick().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    // ---- persistence ----

    /// Snapshot under the lock, write outside it.
    pub async fn persist_now(&self) -> Result<()> {
        let snapshot = { self.state.lock().await.to_persisted() };
        persist::save_state(&self.config.state_file_path, &snapshot)
    }

    async fn run_state_persister(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.state_save_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.persist_now().await {
                        tracing::error!(error = %e, "State persistence failed");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    // ---- service entry point ----

    /// Run the three background loops and the HTTP surface until the
    /// shutdown token fires, then take a final state snapshot.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let health = self.clone();
        let health_shutdown = shutdown.clone();
        tokio::spawn(async move {
            health.run_health_monitor(health_shutdown).await;
        });

        let recovery = self.clone();
        let recovery_shutdown = shutdown.clone();
        tokio::spawn(async move {
            recovery.run_recovery_engine(recovery_shutdown).await;
        });

        let persister = self.clone();
        let persister_shutdown = shutdown.clone();
        tokio::spawn(async move {
            persister.run_state_persister(persister_shutdown).await;
        });

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| OrchestratorError::Internal(format!("Invalid listen address: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "Scheduler listening");

        let server_shutdown = shutdown.clone();
        axum::serve(listener, http::router(self.clone()))
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await?;

        if let Err(e) = self.persist_now().await {
            tracing::error!(error = %e, "Final state snapshot failed");
        }
        Ok(())
    }
}
