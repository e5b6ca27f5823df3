//! End-to-end checks through the public controller API

use std::sync::Arc;
use std::time::Duration;

use ecogrid::config::Config;
use ecogrid::controller::{spawn_controller_tasks, GridController, Topology};
use ecogrid::domain::{EdgeSpec, EdgeStatus, EventKind, NodeAttrs, NodeStatus, NodeType, Priority};
use ecogrid::repo::MemoryStore;
use ecogrid::routing::RoutingAlgorithm;
use ecogrid::GridError;

fn controller() -> (GridController, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let grid = GridController::new(Config::default(), store.clone()).unwrap();
    (grid, store)
}

/// S1 - T1 - C1, with a second feeder S1 - T2 - C1 that is longer
fn feeder_topology() -> Topology {
    let node = |t: NodeType, cap: f64, load: f64| NodeAttrs::new(t, cap).with_load(load);
    Topology {
        nodes: vec![
            ("S1".into(), node(NodeType::Substation, 5000.0, 2000.0).with_efficiency(0.95)),
            ("T1".into(), node(NodeType::Transformer, 2000.0, 800.0).with_efficiency(0.9)),
            ("T2".into(), node(NodeType::Transformer, 2000.0, 600.0).with_efficiency(0.9)),
            ("C1".into(), node(NodeType::Consumer, 400.0, 200.0).with_efficiency(0.85)),
        ],
        edges: vec![
            ("S1".into(), "T1".into(), EdgeSpec::new(10.0, 0.0, 1000.0)),
            ("T1".into(), "C1".into(), EdgeSpec::new(2.0, 0.0, 1000.0)),
            ("S1".into(), "T2".into(), EdgeSpec::new(12.0, 0.0, 1000.0)),
            ("T2".into(), "C1".into(), EdgeSpec::new(3.0, 0.0, 1000.0)),
        ],
    }
}

#[test]
fn routes_follow_topology_changes() {
    let (grid, _) = controller();
    grid.load_topology(&feeder_topology()).unwrap();

    let route = grid.find_route("S1", "C1", RoutingAlgorithm::Dijkstra).unwrap();
    assert!(route.found);
    assert_eq!(route.path, vec!["S1", "T1", "C1"]);
    assert_eq!(route.cost, Some(12.0));

    // Cached until the topology changes
    grid.find_route("S1", "C1", RoutingAlgorithm::Dijkstra).unwrap();
    assert_eq!(grid.router().stats().cache_hits, 1);

    grid.set_edge_status("T1", "C1", EdgeStatus::Maintenance).unwrap();
    let detour = grid.find_route("S1", "C1", RoutingAlgorithm::Dijkstra).unwrap();
    assert_eq!(detour.path, vec!["S1", "T2", "C1"]);
    assert_eq!(detour.cost, Some(15.0));
    assert_eq!(grid.events_by_kind(EventKind::Maintenance).len(), 1);

    let astar = grid.find_route("S1", "C1", RoutingAlgorithm::Astar).unwrap();
    assert_eq!(astar.path, detour.path);
}

#[test]
fn redundant_paths_are_ordered_by_cost() {
    let (grid, _) = controller();
    grid.load_topology(&feeder_topology()).unwrap();

    let paths = grid.find_redundant_paths("S1", "C1", 3).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].nodes, vec!["S1", "T1", "C1"]);
    assert_eq!(paths[1].nodes, vec!["S1", "T2", "C1"]);
    assert!(paths[0].reliability > paths[1].reliability);

    assert!(matches!(
        grid.find_redundant_paths("S1", "C1", 0),
        Err(GridError::Validation { .. })
    ));
}

#[test]
fn overload_is_detected_then_balanced() {
    let (grid, store) = controller();
    grid.load_topology(&feeder_topology()).unwrap();

    let record = grid.update_load("C1", 380.0).unwrap();
    assert_eq!(record.attrs.status, NodeStatus::Overloaded);
    let critical = grid.critical_events(None).unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].kind(), EventKind::OverloadDetected);
    assert_eq!(critical[0].priority(), Priority::Medium);

    let summary = grid.balance_network().unwrap();
    assert_eq!(summary.overloaded_nodes, 1);
    assert_eq!(summary.balanced, 1);
    assert!((summary.total_transferred - 60.0).abs() < 1e-9);
    assert!((grid.search("C1").unwrap().attrs.current_load - 320.0).abs() < 1e-9);

    // The resolved overload no longer waits in the queues
    assert!(grid.events_by_kind(EventKind::OverloadDetected).is_empty());
    assert_eq!(grid.events_by_kind(EventKind::OverloadResolved).len(), 1);
    assert_eq!(store.operations().len(), summary.operations.len());
    assert_eq!(grid.system_stats().balancing.total_passes, 1);
}

#[test]
fn failure_and_recovery_round_trip() {
    let (grid, store) = controller();
    grid.load_topology(&feeder_topology()).unwrap();

    let failure = grid.simulate_failure("T1", 2.0).unwrap();
    assert_eq!(failure.priority(), Priority::Critical);
    let t1 = grid.search("T1").unwrap().attrs;
    assert_eq!(t1.status, NodeStatus::Failed);
    assert_eq!(t1.current_load, 0.0);
    assert_eq!(grid.pop_priority_event().unwrap().id, failure.id);
    assert!(store.events().iter().any(|e| e.id == failure.id));

    let route = grid.find_route("S1", "C1", RoutingAlgorithm::Dijkstra).unwrap();
    assert_eq!(route.path, vec!["S1", "T2", "C1"]);

    grid.recover_node("T1").unwrap();
    assert_eq!(grid.search("T1").unwrap().attrs.status, NodeStatus::Active);
    let route = grid.find_route("S1", "C1", RoutingAlgorithm::Dijkstra).unwrap();
    assert_eq!(route.path, vec!["S1", "T1", "C1"]);

    assert!(matches!(
        grid.recover_node("T1"),
        Err(GridError::Validation { .. })
    ));
}

#[test]
fn deleting_a_node_drops_its_lines() {
    let (grid, _) = controller();
    grid.load_topology(&feeder_topology()).unwrap();

    let removal = grid.delete_node("T1").unwrap();
    assert_eq!(removal.removed_edges, 2);
    assert_eq!(grid.list_edges().len(), 2);
    assert!(matches!(grid.search("T1"), Err(GridError::NotFound { .. })));
    assert!(matches!(
        grid.find_route("T1", "C1", RoutingAlgorithm::Dijkstra),
        Err(GridError::UnknownNode { .. })
    ));
}

#[cfg(feature = "sim")]
#[test]
fn sample_network_is_consistent() {
    let (grid, _) = controller();
    let (nodes, edges) = grid.load_sample_network(20, Some(42)).unwrap();
    assert_eq!(nodes, 30);
    assert_eq!(edges, 41);

    let stats = grid.system_stats();
    assert_eq!(stats.index.size, 30);
    assert!(stats.index.is_balanced);
    assert_eq!(stats.network.node_count, 30);
    assert_eq!(stats.network.isolated_nodes, 0);

    let route = grid.find_route("SUB_0", "CONS_19", RoutingAlgorithm::Astar).unwrap();
    assert!(route.found);
    assert_eq!(route.path.first().map(String::as_str), Some("SUB_0"));
    assert_eq!(route.path.last().map(String::as_str), Some("CONS_19"));

    let cmp = grid.compare_algorithms("SUB_0", "CONS_19").unwrap();
    assert!(cmp.same_cost);
}

#[tokio::test]
async fn balancing_loop_runs_on_startup() {
    let mut cfg = Config::default();
    cfg.simulation.enabled = false;
    cfg.balancer.interval_seconds = 3600;
    let grid = Arc::new(GridController::new(cfg.clone(), Arc::new(MemoryStore::new())).unwrap());
    grid.load_topology(&feeder_topology()).unwrap();
    grid.update_load("C1", 380.0).unwrap();

    let tasks = spawn_controller_tasks(grid.clone(), &cfg);
    assert_eq!(tasks.len(), 1);

    // The first interval tick fires immediately
    for _ in 0..50 {
        if grid.system_stats().balancing.total_passes > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for task in tasks {
        task.abort();
    }
    assert_eq!(grid.system_stats().balancing.total_passes, 1);
    assert!(grid.search("C1").unwrap().utilization <= 0.8 + 1e-9);
}
