//! End-to-end tests driving a scheduler against live node agents.
//!
//! Each agent serves the real HTTP surface on an ephemeral port; the
//! scheduler probes, places, and recovers exactly as it would in
//! production, with shortened grace periods for speed.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use micro_orchestrator::agent::http::{router, AgentState};
use micro_orchestrator::agent::{MetricsSampler, ProcessSupervisor};
use micro_orchestrator::config::SchedulerConfig;
use micro_orchestrator::scheduler::{NodeStatus, Scheduler, WorkloadStatus};

/// A live agent server on an ephemeral port.
struct TestAgent {
    port: u16,
    supervisor: Arc<ProcessSupervisor>,
    server: JoinHandle<()>,
}

impl TestAgent {
    async fn start() -> Self {
        let supervisor = Arc::new(ProcessSupervisor::new(Duration::from_millis(100)));
        let state = AgentState {
            supervisor: supervisor.clone(),
            sampler: Arc::new(MetricsSampler::new()),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = router(state);
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            port,
            supervisor,
            server,
        }
    }

    /// Simulate a host failure: the listener goes away, children stay.
    fn kill(&self) {
        self.server.abort();
    }

    fn key(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn test_scheduler(dir: &TempDir) -> Scheduler {
    let config = SchedulerConfig::default().with_state_file(dir.path().join("state.json"));
    Scheduler::new(config).unwrap()
}

fn write_script(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn test_registered_agent_comes_online_after_one_probe() {
    let dir = TempDir::new().unwrap();
    let agent = TestAgent::start().await;
    let scheduler = test_scheduler(&dir);

    scheduler.register_node("127.0.0.1", agent.port).await;
    scheduler.run_health_check().await;

    let nodes = scheduler.list_nodes().await;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].status, NodeStatus::Online);
    assert_eq!(nodes[0].consecutive_failures, 0);
    assert!(nodes[0].response_time.is_some());
    assert!(nodes[0].total_memory > 0);
}

#[tokio::test]
async fn test_submit_places_workload_on_agent() {
    let dir = TempDir::new().unwrap();
    let agent = TestAgent::start().await;
    let scheduler = test_scheduler(&dir);
    let script = write_script(dir.path(), "work.sh");

    scheduler.register_node("127.0.0.1", agent.port).await;
    scheduler.run_health_check().await;

    let workload = scheduler
        .submit_workload(script.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(workload.status, WorkloadStatus::Running);
    assert_eq!(workload.node, Some(agent.key()));
    let pid = workload.pid.unwrap();
    assert!(pid > 0);

    // The agent really spawned it.
    let records = agent.supervisor.list().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pid, pid);
}

#[tokio::test]
async fn test_stop_removes_workload_and_remote_process() {
    let dir = TempDir::new().unwrap();
    let agent = TestAgent::start().await;
    let scheduler = test_scheduler(&dir);
    let script = write_script(dir.path(), "work.sh");

    scheduler.register_node("127.0.0.1", agent.port).await;
    scheduler.run_health_check().await;
    let workload = scheduler
        .submit_workload(script.to_str().unwrap())
        .await
        .unwrap();

    scheduler.stop_workload(&workload.id).await.unwrap();

    assert!(scheduler.list_workloads().await.is_empty());
    assert!(scheduler.desired_entries().await.is_empty());
    assert!(scheduler.failed_workload_ids().await.is_empty());
    assert!(agent.supervisor.list().await.is_empty());
}

#[tokio::test]
async fn test_failover_to_surviving_agent() {
    let dir = TempDir::new().unwrap();
    let first = TestAgent::start().await;
    let second = TestAgent::start().await;
    let scheduler = test_scheduler(&dir);
    let script = write_script(dir.path(), "work.sh");

    scheduler.register_node("127.0.0.1", first.port).await;
    scheduler.register_node("127.0.0.1", second.port).await;
    scheduler.run_health_check().await;

    let workload = scheduler
        .submit_workload(script.to_str().unwrap())
        .await
        .unwrap();
    let bound_key = workload.node.clone().unwrap();
    let (dead, survivor) = if bound_key == first.key() {
        (&first, &second)
    } else {
        (&second, &first)
    };

    dead.kill();
    // Two failed probes cross the default threshold.
    scheduler.run_health_check().await;
    scheduler.run_health_check().await;

    let nodes = scheduler.list_nodes().await;
    let dead_node = nodes.iter().find(|n| n.key() == dead.key()).unwrap();
    assert_eq!(dead_node.status, NodeStatus::Offline);
    assert_eq!(
        scheduler.failed_workload_ids().await,
        vec![workload.id.clone()]
    );
    let listed = scheduler.list_workloads().await;
    assert_eq!(listed[0].status, WorkloadStatus::Recovering);

    scheduler.run_recovery_tick().await;

    let listed = scheduler.list_workloads().await;
    assert_eq!(listed[0].status, WorkloadStatus::Running);
    assert_eq!(listed[0].node, Some(survivor.key()));
    let new_pid = listed[0].pid.unwrap();
    assert!(scheduler.failed_workload_ids().await.is_empty());

    // Running on the survivor, not duplicated anywhere else.
    let records = survivor.supervisor.list().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pid, new_pid);
    let entries = scheduler.desired_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].node_key(), survivor.key());
}

#[tokio::test]
async fn test_stop_with_unreachable_node_still_removes_workload() {
    let dir = TempDir::new().unwrap();
    let agent = TestAgent::start().await;
    let scheduler = test_scheduler(&dir);
    let script = write_script(dir.path(), "work.sh");

    scheduler.register_node("127.0.0.1", agent.port).await;
    scheduler.run_health_check().await;
    let workload = scheduler
        .submit_workload(script.to_str().unwrap())
        .await
        .unwrap();

    agent.kill();
    scheduler.stop_workload(&workload.id).await.unwrap();

    assert!(scheduler.list_workloads().await.is_empty());
    assert!(scheduler.desired_entries().await.is_empty());
}

#[tokio::test]
async fn test_pending_workload_places_once_a_node_arrives() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);
    let script = write_script(dir.path(), "work.sh");

    let workload = scheduler
        .submit_workload(script.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(workload.status, WorkloadStatus::Pending);

    let agent = TestAgent::start().await;
    scheduler.register_node("127.0.0.1", agent.port).await;
    scheduler.run_health_check().await;
    scheduler.run_recovery_tick().await;

    let listed = scheduler.list_workloads().await;
    assert_eq!(listed[0].status, WorkloadStatus::Running);
    assert_eq!(listed[0].node, Some(agent.key()));
    assert_eq!(agent.supervisor.list().await.len(), 1);
}

#[tokio::test]
async fn test_offline_node_does_not_affect_healthy_node() {
    let dir = TempDir::new().unwrap();
    let agent = TestAgent::start().await;
    let scheduler = test_scheduler(&dir);

    scheduler.register_node("127.0.0.1", agent.port).await;
    scheduler.run_health_check().await;

    // Take the node offline with a port nothing listens on, then point
    // registration back at the live agent.
    scheduler.register_node("127.0.0.1", 1).await;
    scheduler.run_health_check().await;
    scheduler.run_health_check().await;
    let nodes = scheduler.list_nodes().await;
    let dead = nodes.iter().find(|n| n.port == 1).unwrap();
    assert_eq!(dead.status, NodeStatus::Offline);

    scheduler.run_health_check().await;
    let nodes = scheduler.list_nodes().await;
    let live = nodes.iter().find(|n| n.port == agent.port).unwrap();
    assert_eq!(live.status, NodeStatus::Online);
}
