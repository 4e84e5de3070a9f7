use micro_orchestrator::scheduler::placement::select_node;
use micro_orchestrator::scheduler::{NodeInfo, NodeStatus};

fn node(port: u16, status: NodeStatus, cpu: f64, order: u64) -> NodeInfo {
    let mut node = NodeInfo::new("10.0.0.1", port, order);
    node.status = status;
    node.cpu_usage = cpu;
    node
}

#[test]
fn test_lowest_cpu_wins() {
    let nodes = vec![
        node(8080, NodeStatus::Online, 60.0, 0),
        node(8081, NodeStatus::Online, 20.0, 1),
        node(8082, NodeStatus::Online, 40.0, 2),
    ];
    let selected = select_node(&nodes, 80.0, None).unwrap();
    assert_eq!(selected.port, 8081);
}

#[test]
fn test_cpu_ceiling_excludes_busy_nodes() {
    let nodes = vec![
        node(8080, NodeStatus::Online, 95.0, 0),
        node(8081, NodeStatus::Online, 85.0, 1),
    ];
    assert!(select_node(&nodes, 80.0, None).is_none());
}

#[test]
fn test_busy_node_skipped_for_lower_cpu_candidate() {
    let nodes = vec![
        node(8080, NodeStatus::Online, 80.0, 0),
        node(8081, NodeStatus::Online, 79.9, 1),
    ];
    let selected = select_node(&nodes, 80.0, None).unwrap();
    assert_eq!(selected.port, 8081);
}

#[test]
fn test_only_online_nodes_are_candidates() {
    let nodes = vec![
        node(8080, NodeStatus::Offline, 0.0, 0),
        node(8081, NodeStatus::Unknown, 0.0, 1),
        node(8082, NodeStatus::Degraded, 0.0, 2),
        node(8083, NodeStatus::Online, 50.0, 3),
    ];
    let selected = select_node(&nodes, 80.0, None).unwrap();
    assert_eq!(selected.port, 8083);
}

#[test]
fn test_no_online_node_yields_none() {
    let nodes = vec![
        node(8080, NodeStatus::Offline, 0.0, 0),
        node(8081, NodeStatus::Degraded, 10.0, 1),
    ];
    assert!(select_node(&nodes, 80.0, None).is_none());
}

#[test]
fn test_tie_broken_by_registration_order() {
    let nodes = vec![
        node(8081, NodeStatus::Online, 30.0, 1),
        node(8080, NodeStatus::Online, 30.0, 0),
    ];
    let selected = select_node(&nodes, 80.0, None).unwrap();
    assert_eq!(selected.port, 8080);
}

#[test]
fn test_excluded_node_is_skipped() {
    let nodes = vec![
        node(8080, NodeStatus::Online, 10.0, 0),
        node(8081, NodeStatus::Online, 50.0, 1),
    ];
    let selected = select_node(&nodes, 80.0, Some("10.0.0.1:8080")).unwrap();
    assert_eq!(selected.port, 8081);
}

#[test]
fn test_excluded_node_used_when_it_is_the_only_candidate() {
    let nodes = vec![
        node(8080, NodeStatus::Online, 10.0, 0),
        node(8081, NodeStatus::Offline, 0.0, 1),
    ];
    let selected = select_node(&nodes, 80.0, Some("10.0.0.1:8080")).unwrap();
    assert_eq!(selected.port, 8080);
}

#[test]
fn test_empty_registry_yields_none() {
    let nodes: Vec<NodeInfo> = Vec::new();
    assert!(select_node(&nodes, 80.0, None).is_none());
}
