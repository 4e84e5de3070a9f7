use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::scheduler::node::{node_key, NodeInfo};
use crate::scheduler::persist::PersistedState;
use crate::scheduler::workload::{workload_id, Workload, WorkloadStatus};

/// Desired binding of one workload: the node and remote pid it should be
/// running on. An entry exists while the scheduler believes the workload
/// should be running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementEntry {
    pub workload_id: String,
    pub node_host: String,
    pub node_port: u16,
    pub pid: i32,
    pub script_path: String,
}

impl PlacementEntry {
    pub fn node_key(&self) -> String {
        node_key(&self.node_host, self.node_port)
    }
}

/// The registry, workload table, desired placement, and failed set,
/// guarded as one unit by the scheduler's coarse lock.
#[derive(Debug, Default)]
pub struct SchedulerState {
    nodes: HashMap<String, NodeInfo>,
    workloads: HashMap<String, Workload>,
    desired: HashMap<String, PlacementEntry>,
    failed: HashSet<String>,
    next_registration_order: u64,
    next_workload_seq: u64,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed state from a persisted snapshot. Workloads that were awaiting
    /// recovery when the snapshot was taken re-enter the failed set;
    /// everything else is trusted to be in the recorded shape until the
    /// next probe says otherwise.
    pub fn from_persisted(persisted: PersistedState) -> Self {
        let mut state = Self::default();
        for entry in persisted.desired {
            state.desired.insert(entry.workload_id.clone(), entry);
        }
        for workload in persisted.workloads {
            if let Some(seq) = parse_workload_seq(&workload.id) {
                state.next_workload_seq = state.next_workload_seq.max(seq + 1);
            }
            if workload.status == WorkloadStatus::Recovering
                && state.desired.contains_key(&workload.id)
            {
                state.failed.insert(workload.id.clone());
            }
            state.workloads.insert(workload.id.clone(), workload);
        }
        state
    }

    pub fn to_persisted(&self) -> PersistedState {
        let mut desired: Vec<PlacementEntry> = self.desired.values().cloned().collect();
        desired.sort_by(|a, b| a.workload_id.cmp(&b.workload_id));
        PersistedState {
            workloads: self.workloads(),
            desired,
        }
    }

    // ---- registry ----

    /// Register a node, or reset an already-known one for re-probing.
    /// Idempotent with respect to registry membership.
    pub fn register_node(&mut self, host: &str, port: u16) -> String {
        let key = node_key(host, port);
        match self.nodes.get_mut(&key) {
            Some(node) => node.reset(),
            None => {
                let order = self.next_registration_order;
                self.next_registration_order += 1;
                self.nodes.insert(key.clone(), NodeInfo::new(host, port, order));
            }
        }
        key
    }

    pub fn node(&self, key: &str) -> Option<&NodeInfo> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &str) -> Option<&mut NodeInfo> {
        self.nodes.get_mut(key)
    }

    pub fn nodes_iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    /// All nodes, in registration order.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<NodeInfo> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.registration_order);
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- workloads ----

    /// Accept a new workload in `Pending` state.
    pub fn new_workload(&mut self, script_path: &str) -> Workload {
        let id = workload_id(self.next_workload_seq);
        self.next_workload_seq += 1;
        let workload = Workload::new(id.clone(), script_path.to_string());
        self.workloads.insert(id, workload.clone());
        workload
    }

    pub fn workload(&self, id: &str) -> Option<&Workload> {
        self.workloads.get(id)
    }

    /// All workloads, oldest first.
    pub fn workloads(&self) -> Vec<Workload> {
        let mut workloads: Vec<Workload> = self.workloads.values().cloned().collect();
        workloads.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        workloads
    }

    pub fn workload_count(&self) -> usize {
        self.workloads.len()
    }

    /// Record a successful placement: the workload is `Running` on
    /// (host, port) with the given remote pid, and the desired entry is
    /// inserted or replaced. Clears any failed-set membership.
    pub fn bind(&mut self, id: &str, host: &str, port: u16, pid: i32) -> Option<Workload> {
        let workload = self.workloads.get_mut(id)?;
        workload.status = WorkloadStatus::Running;
        workload.node = Some(node_key(host, port));
        workload.pid = Some(pid);
        self.desired.insert(
            id.to_string(),
            PlacementEntry {
                workload_id: id.to_string(),
                node_host: host.to_string(),
                node_port: port,
                pid,
                script_path: workload.script_path.clone(),
            },
        );
        self.failed.remove(id);
        Some(workload.clone())
    }

    /// Move every desired workload bound to `key` into the failed set.
    /// Desired entries are retained so recovery can re-place them.
    /// Returns the affected workload ids.
    pub fn mark_node_failed(&mut self, key: &str) -> Vec<String> {
        let affected: Vec<String> = self
            .desired
            .values()
            .filter(|entry| entry.node_key() == key)
            .map(|entry| entry.workload_id.clone())
            .collect();
        for id in &affected {
            self.failed.insert(id.clone());
            if let Some(workload) = self.workloads.get_mut(id) {
                workload.status = WorkloadStatus::Recovering;
            }
        }
        affected
    }

    /// Remove a workload and all of its bindings. Returns the removed
    /// record (marked `Stopped`) and its desired entry, if any.
    pub fn remove_workload(&mut self, id: &str) -> Option<(Workload, Option<PlacementEntry>)> {
        let mut workload = self.workloads.remove(id)?;
        workload.status = WorkloadStatus::Stopped;
        workload.pid = None;
        self.failed.remove(id);
        let entry = self.desired.remove(id);
        Some((workload, entry))
    }

    // ---- recovery bookkeeping ----

    /// Workload ids awaiting re-placement, in a stable order.
    pub fn failed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.failed.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Pending workloads that have never been placed, oldest first.
    pub fn pending_ids(&self) -> Vec<String> {
        self.workloads()
            .into_iter()
            .filter(|w| w.status == WorkloadStatus::Pending)
            .map(|w| w.id)
            .collect()
    }

    pub fn bump_retry(&mut self, id: &str) {
        if let Some(workload) = self.workloads.get_mut(id) {
            workload.retry_count += 1;
        }
    }

    /// Terminal failure: the workload leaves the failed set but its
    /// desired entry is kept, so an operator can inspect the last binding.
    pub fn mark_workload_failed(&mut self, id: &str) {
        self.failed.remove(id);
        if let Some(workload) = self.workloads.get_mut(id) {
            workload.status = WorkloadStatus::Failed;
        }
    }

    pub fn clear_failed(&mut self, id: &str) {
        self.failed.remove(id);
    }

    /// Workloads currently running outside the failed set with a
    /// non-zero retry counter. A recovery tick snapshots these before
    /// placing anything, so a placement made during the tick has to
    /// survive until a later tick before its counter is forgiven.
    pub fn healthy_running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workloads
            .values()
            .filter(|w| {
                w.status == WorkloadStatus::Running
                    && w.retry_count > 0
                    && !self.failed.contains(&w.id)
            })
            .map(|w| w.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Zero the retry counters of `ids` that are still running healthily.
    pub fn reset_retries(&mut self, ids: &[String]) {
        for id in ids {
            if self.failed.contains(id) {
                continue;
            }
            if let Some(workload) = self.workloads.get_mut(id) {
                if workload.status == WorkloadStatus::Running {
                    workload.retry_count = 0;
                }
            }
        }
    }

    // ---- desired placement ----

    pub fn desired(&self, id: &str) -> Option<&PlacementEntry> {
        self.desired.get(id)
    }

    pub fn desired_count(&self) -> usize {
        self.desired.len()
    }

    pub fn desired_entries(&self) -> Vec<PlacementEntry> {
        let mut entries: Vec<PlacementEntry> = self.desired.values().cloned().collect();
        entries.sort_by(|a, b| a.workload_id.cmp(&b.workload_id));
        entries
    }
}

fn parse_workload_seq(id: &str) -> Option<u64> {
    id.rsplit('_').next()?.parse().ok()
}
