//! # Router
//!
//! Request-facing routing on top of the shared graph: single-pair routes
//! with loss annotation, redundant path enumeration, algorithm comparison
//! and line upgrade suggestions. Results of single-pair queries are cached
//! until the topology changes.

pub mod cache;

pub use cache::*;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::config::RoutingConfig;
use crate::graph::{loss, EuclideanHeuristic, NetworkGraph, RedundantPath, ZeroHeuristic};
use crate::error::GridResult;
use crate::index::NodeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoutingAlgorithm {
    Dijkstra,
    Astar,
}

/// Outcome of a single-pair routing query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub path: Vec<String>,
    /// `None` when the destination is unreachable
    pub cost: Option<f64>,
    pub hops: usize,
    /// Loss for the source node's load at the time the route was computed
    pub power_loss: f64,
    pub algorithm: RoutingAlgorithm,
    pub execution_time_ms: f64,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmComparison {
    pub dijkstra: RouteResult,
    pub astar: RouteResult,
    pub same_cost: bool,
    pub faster: RoutingAlgorithm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpgradeAction {
    UpgradeConductor,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineUpgrade {
    pub from: String,
    pub to: String,
    pub current_loss: f64,
    pub distance: f64,
    pub action: UpgradeAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub total_routes: u64,
    pub cache_size: usize,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub avg_execution_time_ms: f64,
    pub avg_hops: f64,
    pub algorithms_used: BTreeMap<RoutingAlgorithm, u64>,
}

#[derive(Debug, Default)]
struct RouteLedger {
    computed: u64,
    total_time_ms: f64,
    total_hops: u64,
    by_algorithm: BTreeMap<RoutingAlgorithm, u64>,
}

pub struct Router {
    graph: Arc<RwLock<NetworkGraph>>,
    index: Arc<RwLock<NodeIndex>>,
    cache: Mutex<RouteCache>,
    ledger: Mutex<RouteLedger>,
    /// (generation, admissible) of the last Euclidean admissibility check
    admissibility: Mutex<Option<(u64, bool)>>,
    nominal_voltage: f64,
}

impl Router {
    pub fn new(
        graph: Arc<RwLock<NetworkGraph>>,
        index: Arc<RwLock<NodeIndex>>,
        cfg: &RoutingConfig,
    ) -> GridResult<Self> {
        Ok(Self {
            graph,
            index,
            cache: Mutex::new(RouteCache::new(cfg.cache_capacity)?),
            ledger: Mutex::new(RouteLedger::default()),
            admissibility: Mutex::new(None),
            nominal_voltage: cfg.nominal_voltage,
        })
    }

    /// Cheapest route from `source` to `destination`, served from cache when
    /// the topology is unchanged since the last identical query
    pub fn find_optimal_route(
        &self,
        source: &str,
        destination: &str,
        algorithm: RoutingAlgorithm,
    ) -> GridResult<RouteResult> {
        let graph = self.graph.read();
        let generation = graph.generation();
        let key = RouteKey::new(source, destination, algorithm);

        if let Some(hit) = self.cache.lock().get(&key, generation) {
            debug!(source, destination, %algorithm, "route cache hit");
            return Ok(hit);
        }

        let result = self.compute(&graph, source, destination, algorithm)?;
        self.cache.lock().put(key, generation, result.clone());
        Ok(result)
    }

    fn compute(
        &self,
        graph: &NetworkGraph,
        source: &str,
        destination: &str,
        algorithm: RoutingAlgorithm,
    ) -> GridResult<RouteResult> {
        let started = Instant::now();
        let route = match algorithm {
            RoutingAlgorithm::Dijkstra => graph.dijkstra(source, destination)?,
            RoutingAlgorithm::Astar if self.euclidean_admissible(graph) => {
                graph.astar(source, destination, &EuclideanHeuristic)?
            }
            RoutingAlgorithm::Astar => graph.astar(source, destination, &ZeroHeuristic)?,
        };
        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let power_loss = if route.is_reachable() {
            let (load, voltage) = self.source_load(source);
            graph.power_loss(&route.path, load, voltage)?
        } else {
            0.0
        };

        let found = route.is_reachable();
        let result = RouteResult {
            hops: route.hops(),
            cost: found.then_some(route.cost),
            path: route.path,
            power_loss,
            algorithm,
            execution_time_ms,
            found,
        };

        let mut ledger = self.ledger.lock();
        ledger.computed += 1;
        ledger.total_time_ms += execution_time_ms;
        ledger.total_hops += result.hops as u64;
        *ledger.by_algorithm.entry(algorithm).or_default() += 1;

        Ok(result)
    }

    /// Graph lock is held by the caller, which keeps graph-before-index order
    fn source_load(&self, source: &str) -> (f64, f64) {
        match self.index.read().get(source) {
            Some(attrs) if attrs.voltage > 0.0 => (attrs.current_load, attrs.voltage),
            Some(attrs) => (attrs.current_load, self.nominal_voltage),
            None => (0.0, self.nominal_voltage),
        }
    }

    fn euclidean_admissible(&self, graph: &NetworkGraph) -> bool {
        let generation = graph.generation();
        let mut memo = self.admissibility.lock();
        if let Some((g, ok)) = *memo {
            if g == generation {
                return ok;
            }
        }
        let ok = EuclideanHeuristic::is_admissible_for(graph);
        if !ok {
            warn!(generation, "node positions overestimate line costs; A* falls back to a zero heuristic");
        }
        *memo = Some((generation, ok));
        ok
    }

    /// Up to `k` alternative routes for failover planning
    pub fn find_redundant_paths(
        &self,
        source: &str,
        destination: &str,
        k: usize,
    ) -> GridResult<Vec<RedundantPath>> {
        self.graph.read().find_k_redundant_paths(source, destination, k)
    }

    /// Run both algorithms uncached on the same snapshot
    pub fn compare_algorithms(&self, source: &str, destination: &str) -> GridResult<AlgorithmComparison> {
        let graph = self.graph.read();
        let dijkstra = self.compute(&graph, source, destination, RoutingAlgorithm::Dijkstra)?;
        let astar = self.compute(&graph, source, destination, RoutingAlgorithm::Astar)?;
        let same_cost = match (dijkstra.cost, astar.cost) {
            (Some(a), Some(b)) => (a - b).abs() < 1e-9,
            (None, None) => true,
            _ => false,
        };
        let faster = if astar.execution_time_ms < dijkstra.execution_time_ms {
            RoutingAlgorithm::Astar
        } else {
            RoutingAlgorithm::Dijkstra
        };
        Ok(AlgorithmComparison {
            dijkstra,
            astar,
            same_cost,
            faster,
        })
    }

    /// Lines whose loss at the heavier endpoint's current load exceeds
    /// `threshold_loss`, worst first
    pub fn suggest_line_upgrades(&self, threshold_loss: f64) -> Vec<LineUpgrade> {
        let graph = self.graph.read();
        let index = self.index.read();
        let endpoint = |id: &str| {
            index
                .get(id)
                .map(|a| {
                    let v = if a.voltage > 0.0 { a.voltage } else { self.nominal_voltage };
                    (a.current_load, v)
                })
                .unwrap_or((0.0, self.nominal_voltage))
        };

        let mut suggestions: Vec<LineUpgrade> = graph
            .edges()
            .filter_map(|record| {
                let edge = graph.edge_between(&record.from, &record.to)?;
                let (la, va) = endpoint(&record.from);
                let (lb, vb) = endpoint(&record.to);
                let (load, voltage) = if la >= lb { (la, va) } else { (lb, vb) };
                let current_loss = loss::edge_loss(edge, load, voltage);
                (current_loss > threshold_loss).then(|| LineUpgrade {
                    action: if current_loss > 2.0 * threshold_loss {
                        UpgradeAction::UpgradeConductor
                    } else {
                        UpgradeAction::Maintenance
                    },
                    from: record.from,
                    to: record.to,
                    current_loss,
                    distance: record.spec.distance,
                })
            })
            .collect();
        suggestions.sort_by(|a, b| b.current_loss.total_cmp(&a.current_loss));
        suggestions
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> RoutingStats {
        let cache = self.cache.lock().stats();
        let ledger = self.ledger.lock();
        let computed = ledger.computed.max(1) as f64;
        RoutingStats {
            total_routes: ledger.computed + cache.hits,
            cache_size: cache.size,
            cache_capacity: cache.capacity,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            avg_execution_time_ms: ledger.total_time_ms / computed,
            avg_hops: ledger.total_hops as f64 / computed,
            algorithms_used: ledger.by_algorithm.clone(),
        }
    }
}
