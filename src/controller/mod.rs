//! # Grid Controller
//!
//! Request-serving facade that owns the shared grid state: node index,
//! topology graph, event bus, router and balancer. All mutations go through
//! here so that both structures stay in step, events are raised and the
//! persistence hook sees every committed change.
//!
//! Whenever both structures are locked, the graph is locked first.

pub mod tasks;

pub use tasks::spawn_controller_tasks;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::balancer::{
    BalanceSummary, BalancingStats, CarbonReport, EfficiencyReport, LoadBalancer,
    OptimizationSummary,
};
use crate::config::Config;
use crate::domain::{
    EdgeRecord, EdgeSpec, EdgeStatus, Event, EventData, EventKind, NodeAttrs, NodeRecord,
    Priority,
};
use crate::error::{GridError, GridResult};
use crate::events::{EventBus, EventStats};
use crate::graph::{CostModel, NetworkGraph, NetworkStats, RedundantPath};
use crate::index::{IndexStats, NodeIndex, OverloadedNode};
use crate::repo::GridStore;
use crate::routing::{
    AlgorithmComparison, LineUpgrade, RouteResult, Router, RoutingAlgorithm, RoutingStats,
};

/// Nodes and lines to load into an empty controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<(String, NodeAttrs)>,
    pub edges: Vec<(String, String, EdgeSpec)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRemoval {
    pub node_id: String,
    pub attrs: NodeAttrs,
    pub removed_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub index: IndexStats,
    pub network: NetworkStats,
    pub routing: RoutingStats,
    pub balancing: BalancingStats,
    pub events: EventStats,
    pub efficiency: EfficiencyReport,
}

pub struct GridController {
    cfg: Config,
    index: Arc<RwLock<NodeIndex>>,
    graph: Arc<RwLock<NetworkGraph>>,
    events: Arc<EventBus>,
    router: Router,
    balancer: LoadBalancer,
    store: Arc<dyn GridStore>,
}

impl GridController {
    pub fn new(cfg: Config, store: Arc<dyn GridStore>) -> GridResult<Self> {
        let cost = CostModel {
            resistance_factor: cfg.routing.resistance_factor,
            reliability_decay: cfg.routing.reliability_decay,
        };
        let index = Arc::new(RwLock::new(NodeIndex::new()));
        let graph = Arc::new(RwLock::new(NetworkGraph::with_cost_model(cost)));
        let events = Arc::new(EventBus::new(&cfg.events, store.clone())?);
        let router = Router::new(graph.clone(), index.clone(), &cfg.routing)?;
        let balancer = LoadBalancer::new(
            index.clone(),
            graph.clone(),
            events.clone(),
            store.clone(),
            cfg.balancer.clone(),
        );
        Ok(Self {
            cfg,
            index,
            graph,
            events,
            router,
            balancer,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    fn commit(&self, record: &NodeRecord) {
        if let Err(e) = self.store.commit_node(record) {
            warn!(node_id = %record.node_id, error = %e, "failed to persist node");
        }
    }

    fn overload_check(&self, record: &NodeRecord) {
        let attrs = &record.attrs;
        if !attrs.is_failed() && record.utilization > self.cfg.balancer.overload_threshold {
            self.events.publish(Event::new(
                record.node_id.clone(),
                EventData::OverloadDetected {
                    load: attrs.current_load,
                    capacity: attrs.capacity,
                    utilization: record.utilization,
                },
            ));
        }
    }

    // ---- nodes ----

    pub fn create_node(&self, node_id: impl Into<String>, attrs: NodeAttrs) -> GridResult<NodeRecord> {
        let node_id = node_id.into();
        attrs.validate("create_node")?;

        let record = {
            let mut graph = self.graph.write();
            let mut index = self.index.write();
            if index.contains(&node_id) {
                return Err(GridError::DuplicateKey {
                    operation: "create_node",
                    key: node_id,
                });
            }
            graph.add_node(node_id.clone(), attrs.node_type, attrs.capacity)?;
            if let Some(position) = attrs.position {
                graph.set_position(&node_id, position)?;
            }
            if let Err(e) = index.insert(node_id.clone(), attrs) {
                graph.remove_node(&node_id)?;
                return Err(e);
            }
            NodeRecord::new(node_id.clone(), index.search(&node_id)?.clone())
        };

        info!(node_id = %record.node_id, node_type = %record.attrs.node_type, "node created");
        self.commit(&record);
        self.overload_check(&record);
        Ok(record)
    }

    /// Set a node's load; raises `overload_detected` above the overload threshold
    pub fn update_load(&self, node_id: &str, load: f64) -> GridResult<NodeRecord> {
        let record = {
            let mut index = self.index.write();
            NodeRecord::new(node_id, index.update_load(node_id, load)?.clone())
        };
        self.commit(&record);
        self.overload_check(&record);
        Ok(record)
    }

    /// Remove a node and every line touching it
    pub fn delete_node(&self, node_id: &str) -> GridResult<NodeRemoval> {
        let mut graph = self.graph.write();
        let mut index = self.index.write();
        let attrs = index.delete(node_id)?;
        let removed_edges = graph.remove_node(node_id).unwrap_or_else(|e| {
            warn!(node_id, error = %e, "indexed node was missing from the graph");
            0
        });
        info!(node_id, removed_edges, "node deleted");
        Ok(NodeRemoval {
            node_id: node_id.to_string(),
            attrs,
            removed_edges,
        })
    }

    pub fn search(&self, node_id: &str) -> GridResult<NodeRecord> {
        let index = self.index.read();
        Ok(NodeRecord::new(node_id, index.search(node_id)?.clone()))
    }

    /// Every node in ascending id order
    pub fn list_nodes(&self) -> Vec<NodeRecord> {
        self.index
            .read()
            .iter()
            .map(|(id, attrs)| NodeRecord::new(id, attrs.clone()))
            .collect()
    }

    /// Nodes above `threshold` (default: the configured overload threshold)
    pub fn get_overloaded_nodes(&self, threshold: Option<f64>) -> Vec<OverloadedNode> {
        let threshold = threshold.unwrap_or(self.cfg.balancer.overload_threshold);
        self.index.read().get_overloaded_nodes(threshold)
    }

    // ---- lines ----

    pub fn add_edge(&self, from: &str, to: &str, spec: EdgeSpec) -> GridResult<EdgeRecord> {
        self.graph.write().add_edge(from, to, spec)?;
        Ok(EdgeRecord {
            from: from.to_string(),
            to: to.to_string(),
            spec,
            status: EdgeStatus::Active,
        })
    }

    pub fn remove_edge(&self, from: &str, to: &str) -> GridResult<()> {
        self.graph.write().remove_edge(from, to)
    }

    /// Change a line's status; entering maintenance raises a `maintenance` event
    pub fn set_edge_status(&self, from: &str, to: &str, status: EdgeStatus) -> GridResult<EdgeStatus> {
        let previous = self.graph.write().set_edge_status(from, to, status)?;
        if status == EdgeStatus::Maintenance && previous != EdgeStatus::Maintenance {
            self.events.publish(Event::new(
                from,
                EventData::Maintenance {
                    from: from.to_string(),
                    to: to.to_string(),
                },
            ));
        }
        Ok(previous)
    }

    pub fn list_edges(&self) -> Vec<EdgeRecord> {
        self.graph.read().edges().collect()
    }

    // ---- routing ----

    pub fn find_route(&self, source: &str, destination: &str, algorithm: RoutingAlgorithm) -> GridResult<RouteResult> {
        self.router.find_optimal_route(source, destination, algorithm)
    }

    pub fn find_redundant_paths(&self, source: &str, destination: &str, k: usize) -> GridResult<Vec<RedundantPath>> {
        self.router.find_redundant_paths(source, destination, k)
    }

    pub fn compare_algorithms(&self, source: &str, destination: &str) -> GridResult<AlgorithmComparison> {
        self.router.compare_algorithms(source, destination)
    }

    pub fn suggest_line_upgrades(&self, threshold_loss: f64) -> Vec<LineUpgrade> {
        self.router.suggest_line_upgrades(threshold_loss)
    }

    // ---- balancing ----

    pub fn balance_network(&self) -> GridResult<BalanceSummary> {
        self.balancer.balance_network()
    }

    pub fn optimize_efficiency(&self) -> GridResult<OptimizationSummary> {
        self.balancer.optimize_efficiency()
    }

    pub fn efficiency(&self) -> EfficiencyReport {
        self.balancer.efficiency()
    }

    pub fn carbon_footprint(&self) -> CarbonReport {
        self.balancer.carbon_footprint()
    }

    // ---- failures ----

    /// Take a node out of service: its load drops to zero, its active lines
    /// fail and a critical `failure` event is raised
    pub fn simulate_failure(&self, node_id: &str, duration_hours: f64) -> GridResult<Event> {
        if !(duration_hours.is_finite() && duration_hours > 0.0) {
            return Err(GridError::validation(
                "simulate_failure",
                format!("duration_hours must be > 0, got {duration_hours}"),
            ));
        }

        let (previous_load, failed_edges, record) = {
            let mut graph = self.graph.write();
            let mut index = self.index.write();
            let previous_load = index.search(node_id)?.current_load;
            let mut failed_edges = 0;
            for edge in graph.incident_edges(node_id)? {
                if edge.status == EdgeStatus::Active {
                    graph.set_edge_status(&edge.from, &edge.to, EdgeStatus::Failed)?;
                    failed_edges += 1;
                }
            }
            index.set_failed(node_id, true)?;
            let attrs = index.update_load(node_id, 0.0)?.clone();
            (previous_load, failed_edges, NodeRecord::new(node_id, attrs))
        };

        self.commit(&record);
        let event = Event::new(
            node_id,
            EventData::Failure {
                previous_load,
                failed_edges,
                duration_hours,
            },
        );
        self.events.publish(event.clone());
        Ok(event)
    }

    /// Return a failed node to service and restore its failed lines whose far
    /// end is not itself failed
    pub fn recover_node(&self, node_id: &str) -> GridResult<Event> {
        let (restored_edges, record) = {
            let mut graph = self.graph.write();
            let mut index = self.index.write();
            if !index.search(node_id)?.is_failed() {
                return Err(GridError::validation(
                    "recover_node",
                    format!("{node_id} is not failed"),
                ));
            }
            let mut restored_edges = 0;
            for edge in graph.incident_edges(node_id)? {
                let far = if edge.from == node_id { &edge.to } else { &edge.from };
                let far_failed = index.get(far).is_some_and(|a| a.is_failed());
                if edge.status == EdgeStatus::Failed && !far_failed {
                    graph.set_edge_status(&edge.from, &edge.to, EdgeStatus::Active)?;
                    restored_edges += 1;
                }
            }
            let attrs = index.set_failed(node_id, false)?.clone();
            (restored_edges, NodeRecord::new(node_id, attrs))
        };

        self.commit(&record);
        let event = Event::new(node_id, EventData::Recovery { restored_edges });
        self.events.publish(event.clone());
        Ok(event)
    }

    // ---- events ----

    pub fn dequeue_event(&self) -> GridResult<Event> {
        self.events.dequeue()
    }

    pub fn pop_priority_event(&self) -> GridResult<Event> {
        self.events.pop_priority()
    }

    pub fn peek_event(&self) -> Option<Event> {
        self.events.peek_priority()
    }

    /// Pending events with priority at or above `threshold` (1..=5)
    pub fn critical_events(&self, threshold: Option<u8>) -> GridResult<Vec<Event>> {
        let threshold = threshold
            .map(Priority::try_from)
            .transpose()
            .map_err(|message| GridError::validation("critical_events", message))?;
        Ok(self.events.critical_events(threshold))
    }

    pub fn events_by_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events.events_by_kind(kind)
    }

    pub fn event_stats(&self) -> EventStats {
        self.events.stats()
    }

    pub fn clear_events(&self) -> (usize, usize) {
        self.events.clear()
    }

    // ---- bulk & stats ----

    /// Create every node, then every line; stops at the first error
    pub fn load_topology(&self, topology: &Topology) -> GridResult<(usize, usize)> {
        for (id, attrs) in &topology.nodes {
            self.create_node(id.clone(), attrs.clone())?;
        }
        for (from, to, spec) in &topology.edges {
            self.add_edge(from, to, *spec)?;
        }
        info!(
            nodes = topology.nodes.len(),
            edges = topology.edges.len(),
            "topology loaded"
        );
        Ok((topology.nodes.len(), topology.edges.len()))
    }

    #[cfg(feature = "sim")]
    pub fn load_sample_network(&self, consumers: usize, seed: Option<u64>) -> GridResult<(usize, usize)> {
        self.load_topology(&crate::simulation::sample_network(consumers, seed))
    }

    pub fn system_stats(&self) -> SystemStats {
        let (network, index) = {
            let graph = self.graph.read();
            let index = self.index.read();
            (graph.network_stats(), index.stats())
        };
        SystemStats {
            index,
            network,
            routing: self.router.stats(),
            balancing: self.balancer.stats(),
            events: self.events.stats(),
            efficiency: self.balancer.efficiency(),
        }
    }
}
