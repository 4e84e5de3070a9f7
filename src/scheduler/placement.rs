use std::cmp::Ordering;

use crate::scheduler::node::{NodeInfo, NodeStatus};

/// Pick the best node for a workload.
///
/// Candidates must be `Online` with CPU% below the ceiling; among them
/// the lowest observed CPU wins, ties broken by registration order.
/// `exclude` drops the workload's last-bound node from consideration
/// unless it is the only candidate left.
pub fn select_node<'a, I>(nodes: I, cpu_ceiling: f64, exclude: Option<&str>) -> Option<&'a NodeInfo>
where
    I: IntoIterator<Item = &'a NodeInfo>,
{
    let candidates: Vec<&NodeInfo> = nodes
        .into_iter()
        .filter(|n| n.status == NodeStatus::Online && n.cpu_usage < cpu_ceiling)
        .collect();

    let preferred: Vec<&NodeInfo> = match exclude {
        Some(key) => {
            let kept: Vec<&NodeInfo> = candidates
                .iter()
                .copied()
                .filter(|n| n.key() != key)
                .collect();
            if kept.is_empty() {
                candidates
            } else {
                kept
            }
        }
        None => candidates,
    };

    preferred.into_iter().min_by(|a, b| {
        a.cpu_usage
            .partial_cmp(&b.cpu_usage)
            .unwrap_or(Ordering::Equal)
            .then(a.registration_order.cmp(&b.registration_order))
    })
}
