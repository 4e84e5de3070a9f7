use std::time::Duration;

use chrono::Utc;

use crate::scheduler::client::AgentStatus;
use crate::scheduler::node::{NodeInfo, NodeStatus};

/// Event raised by a probe-outcome transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// The node crossed the failure threshold and is now offline.
    NodeFailed(String),
    /// The node responded again after being offline.
    NodeRejoined(String),
}

/// Apply a successful probe to a node's state machine.
///
/// Metrics fields are updated only here, from the probe response; the
/// failure counter resets and the node becomes `Online`. Returns a
/// rejoin event when the node was previously `Offline`.
pub fn record_probe_success(
    node: &mut NodeInfo,
    status: &AgentStatus,
    rtt: Duration,
) -> Option<HealthEvent> {
    let rejoined = node.status == NodeStatus::Offline;

    node.status = NodeStatus::Online;
    node.consecutive_failures = 0;
    node.cpu_usage = status.cpu_usage;
    node.memory_usage = status.memory_usage;
    node.total_memory = status.total_memory;
    node.available_memory = status.available_memory;
    node.running_processes = status.running_processes;
    node.last_probe = Some(Utc::now());
    node.response_time = Some(rtt.as_secs_f64());

    rejoined.then(|| HealthEvent::NodeRejoined(node.key()))
}

/// Apply a failed probe to a node's state machine.
///
/// The counter keeps rising past the threshold; the failure event fires
/// only on the transition into `Offline`, not on every tick thereafter.
pub fn record_probe_failure(node: &mut NodeInfo, failure_threshold: u32) -> Option<HealthEvent> {
    let was_offline = node.status == NodeStatus::Offline;
    node.consecutive_failures += 1;
    node.last_probe = Some(Utc::now());

    if node.consecutive_failures >= failure_threshold {
        node.status = NodeStatus::Offline;
        if !was_offline {
            return Some(HealthEvent::NodeFailed(node.key()));
        }
    } else {
        node.status = NodeStatus::Degraded;
    }
    None
}
