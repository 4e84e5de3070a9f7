use micro_orchestrator::config::SchedulerConfig;
use micro_orchestrator::scheduler::{Scheduler, SchedulerState, WorkloadStatus};
use tempfile::TempDir;

fn test_scheduler(dir: &TempDir) -> Scheduler {
    let config = SchedulerConfig::default().with_state_file(dir.path().join("state.json"));
    Scheduler::new(config).unwrap()
}

#[tokio::test]
async fn test_submission_without_nodes_is_held_pending() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);

    let workload = scheduler.submit_workload("./work.sh").await.unwrap();
    assert_eq!(workload.status, WorkloadStatus::Pending);
    assert!(workload.node.is_none());
    assert!(workload.pid.is_none());

    let listed = scheduler.list_workloads().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, workload.id);
}

#[tokio::test]
async fn test_workload_id_format() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);

    let workload = scheduler.submit_workload("./work.sh").await.unwrap();
    let parts: Vec<&str> = workload.id.splitn(3, '_').collect();
    assert_eq!(parts[0], "workload");
    assert!(parts[1].parse::<i64>().is_ok(), "id was {}", workload.id);
    assert!(parts[2].parse::<u64>().is_ok(), "id was {}", workload.id);
}

#[tokio::test]
async fn test_submitting_empty_script_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);
    assert!(scheduler.submit_workload("  ").await.is_err());
    assert!(scheduler.list_workloads().await.is_empty());
}

#[tokio::test]
async fn test_retry_exhaustion_marks_workload_terminally_failed() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);

    let workload = scheduler.submit_workload("./work.sh").await.unwrap();

    // No nodes exist, so each tick is a failed placement attempt.
    for _ in 0..scheduler.config().max_retries {
        scheduler.run_recovery_tick().await;
    }
    scheduler.run_recovery_tick().await;

    let listed = scheduler.list_workloads().await;
    assert_eq!(listed[0].status, WorkloadStatus::Failed);
    assert_eq!(listed[0].retry_count, scheduler.config().max_retries);
    assert!(scheduler.failed_workload_ids().await.is_empty());

    // Terminal: further ticks must not revive it.
    scheduler.run_recovery_tick().await;
    scheduler.run_recovery_tick().await;
    let listed = scheduler.list_workloads().await;
    assert_eq!(listed[0].status, WorkloadStatus::Failed);
    assert_eq!(listed[0].id, workload.id);
}

#[tokio::test]
async fn test_stop_clears_desired_and_failed_membership() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);

    let workload = scheduler.submit_workload("./work.sh").await.unwrap();
    scheduler.stop_workload(&workload.id).await.unwrap();

    assert!(scheduler.list_workloads().await.is_empty());
    assert!(scheduler.failed_workload_ids().await.is_empty());
    assert!(scheduler.desired_entries().await.is_empty());
}

#[tokio::test]
async fn test_stop_unknown_workload_is_an_error() {
    let dir = TempDir::new().unwrap();
    let scheduler = test_scheduler(&dir);
    assert!(scheduler.stop_workload("workload_0_0").await.is_err());
}

#[test]
fn test_failed_set_membership_implies_desired_entry() {
    let mut state = SchedulerState::new();
    state.register_node("localhost", 8080);

    let bound = state.new_workload("./bound.sh");
    state.bind(&bound.id, "localhost", 8080, 42);
    // A workload that never placed has no desired entry and must not
    // enter the failed set when the node dies.
    state.new_workload("./pending.sh");

    state.mark_node_failed("localhost:8080");

    for id in state.failed_ids() {
        assert!(state.desired(&id).is_some());
    }
    assert_eq!(state.failed_ids(), vec![bound.id]);
}

#[test]
fn test_terminal_failure_keeps_desired_entry() {
    let mut state = SchedulerState::new();
    state.register_node("localhost", 8080);

    let workload = state.new_workload("./work.sh");
    state.bind(&workload.id, "localhost", 8080, 42);
    state.mark_node_failed("localhost:8080");

    state.mark_workload_failed(&workload.id);
    assert!(state.failed_ids().is_empty());
    assert!(state.desired(&workload.id).is_some());
    assert_eq!(
        state.workload(&workload.id).unwrap().status,
        WorkloadStatus::Failed
    );
}

#[test]
fn test_rebind_replaces_previous_binding() {
    let mut state = SchedulerState::new();
    state.register_node("localhost", 8080);
    state.register_node("localhost", 8081);

    let workload = state.new_workload("./work.sh");
    state.bind(&workload.id, "localhost", 8080, 42);
    state.mark_node_failed("localhost:8080");
    state.bind(&workload.id, "localhost", 8081, 43);

    // Exactly one binding at a time.
    let entries = state.desired_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].node_port, 8081);
    assert_eq!(entries[0].pid, 43);
    assert!(state.failed_ids().is_empty());

    let updated = state.workload(&workload.id).unwrap();
    assert_eq!(updated.status, WorkloadStatus::Running);
    assert_eq!(updated.pid, Some(43));
}

#[test]
fn test_retry_counter_resets_on_the_tick_after_placement() {
    let mut state = SchedulerState::new();
    state.register_node("localhost", 8080);

    let workload = state.new_workload("./work.sh");
    state.bump_retry(&workload.id);
    state.bump_retry(&workload.id);

    // The tick that performs the placement snapshots its candidates
    // before placing, so the counter survives that tick intact.
    let settled = state.healthy_running_ids();
    assert!(settled.is_empty());
    state.bind(&workload.id, "localhost", 8080, 42);
    state.reset_retries(&settled);
    assert_eq!(state.workload(&workload.id).unwrap().retry_count, 2);

    // A later tick that still sees it running healthily forgives it.
    let settled = state.healthy_running_ids();
    assert_eq!(settled, vec![workload.id.clone()]);
    state.reset_retries(&settled);
    assert_eq!(state.workload(&workload.id).unwrap().retry_count, 0);
}

#[test]
fn test_retry_budget_survives_a_flapping_node() {
    let mut state = SchedulerState::new();
    state.register_node("localhost", 8080);
    state.register_node("localhost", 8081);

    let workload = state.new_workload("./work.sh");
    state.bump_retry(&workload.id);

    // Placed this tick, but the new node dies before the next tick
    // runs: the counter must not have been re-armed in between.
    let settled = state.healthy_running_ids();
    state.bind(&workload.id, "localhost", 8081, 42);
    state.reset_retries(&settled);
    state.mark_node_failed("localhost:8081");

    assert_eq!(state.workload(&workload.id).unwrap().retry_count, 1);
}

#[test]
fn test_retry_counter_not_reset_while_awaiting_recovery() {
    let mut state = SchedulerState::new();
    state.register_node("localhost", 8080);

    let workload = state.new_workload("./work.sh");
    state.bind(&workload.id, "localhost", 8080, 42);
    state.mark_node_failed("localhost:8080");
    state.bump_retry(&workload.id);

    // A recovering workload is never a reset candidate.
    assert!(state.healthy_running_ids().is_empty());
    state.reset_retries(&[workload.id.clone()]);
    assert_eq!(state.workload(&workload.id).unwrap().retry_count, 1);
}
