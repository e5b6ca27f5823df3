//! # Load Balancer
//!
//! Greedy redistribution of load from overloaded nodes to adjacent nodes
//! with headroom, plus an efficiency pass that pulls load toward efficient
//! under-used nodes.
//!
//! A pass holds the graph read lock and the index write lock for its whole
//! duration, so every transfer sees a consistent topology and load picture.
//! Events and store commits are issued after both locks are released.

pub mod efficiency;

pub use efficiency::*;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BalancerConfig;
use crate::domain::{BalancingOperation, Event, EventData, NodeRecord, TransferKind};
use crate::error::{GridError, GridResult};
use crate::events::EventBus;
use crate::graph::{EdgeHandle, NetworkGraph};
use crate::index::NodeIndex;
use crate::repo::GridStore;

/// Transfers below this are treated as no-ops
const MIN_TRANSFER: f64 = 1e-9;
/// Operations kept for `BalancingStats::recent_operations`
const RECENT_OPERATIONS: usize = 5;
/// Utilization under which an efficient node attracts load
const UNDERUSED_UTILIZATION: f64 = 0.6;
/// Efficiency above which a node attracts load
const EFFICIENT_NODE: f64 = 0.85;
/// Share of a neighbor's load one efficiency pass may move
const MAX_ATTRACT_SHARE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub pass_id: Uuid,
    pub overloaded_nodes: usize,
    pub balanced: usize,
    pub unresolved: usize,
    /// balanced / overloaded_nodes, 1.0 when nothing was overloaded
    pub success_rate: f64,
    pub total_transferred: f64,
    pub operations: Vec<BalancingOperation>,
    pub efficiency: EfficiencyReport,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub optimizations_performed: usize,
    pub total_efficiency_gain: f64,
    pub total_transferred: f64,
    pub operations: Vec<BalancingOperation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingStats {
    pub total_passes: u64,
    pub total_operations: u64,
    pub total_load_transferred: f64,
    pub avg_transfer_per_operation: f64,
    pub recent_operations: Vec<BalancingOperation>,
}

#[derive(Debug, Default)]
struct Ledger {
    passes: u64,
    operations: u64,
    transferred: f64,
    recent: VecDeque<BalancingOperation>,
}

impl Ledger {
    fn record(&mut self, ops: &[BalancingOperation]) {
        for op in ops {
            self.operations += 1;
            self.transferred += op.amount;
            if self.recent.len() == RECENT_OPERATIONS {
                self.recent.pop_front();
            }
            self.recent.push_back(op.clone());
        }
    }
}

/// What one locked pass produced; published once the locks are gone
#[derive(Default)]
struct PassOutput {
    operations: Vec<BalancingOperation>,
    events: Vec<Event>,
    touched: Vec<NodeRecord>,
    resolved: Vec<String>,
}

pub struct LoadBalancer {
    index: Arc<RwLock<NodeIndex>>,
    graph: Arc<RwLock<NetworkGraph>>,
    events: Arc<EventBus>,
    store: Arc<dyn GridStore>,
    cfg: BalancerConfig,
    pass_guard: Mutex<()>,
    ledger: Mutex<Ledger>,
}

impl LoadBalancer {
    pub fn new(
        index: Arc<RwLock<NodeIndex>>,
        graph: Arc<RwLock<NetworkGraph>>,
        events: Arc<EventBus>,
        store: Arc<dyn GridStore>,
        cfg: BalancerConfig,
    ) -> Self {
        Self {
            index,
            graph,
            events,
            store,
            cfg,
            pass_guard: Mutex::new(()),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.cfg
    }

    /// Relieve every node above the overload threshold, in ascending id order
    ///
    /// Rejects with [`GridError::BalancingInProgress`] while another pass
    /// (balancing or efficiency) is running.
    pub fn balance_network(&self) -> GridResult<BalanceSummary> {
        let _pass = self
            .pass_guard
            .try_lock()
            .ok_or(GridError::BalancingInProgress)?;
        let started = Instant::now();

        let (out, overloaded, unresolved, efficiency) = {
            let graph = self.graph.read();
            let mut index = self.index.write();
            let (out, overloaded, unresolved) = self.relieve_overloads(&graph, &mut index)?;
            let efficiency = calculate_efficiency(&index);
            (out, overloaded, unresolved, efficiency)
        };

        let balanced = out.resolved.len();
        let total_transferred = out.operations.iter().map(|op| op.amount).sum();
        self.publish(&out, TransferKind::Balance);
        self.events.clear_overloads_for(&out.resolved);

        let summary = BalanceSummary {
            pass_id: Uuid::new_v4(),
            overloaded_nodes: overloaded,
            balanced,
            unresolved,
            success_rate: if overloaded == 0 {
                1.0
            } else {
                balanced as f64 / overloaded as f64
            },
            total_transferred,
            operations: out.operations,
            efficiency,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            pass_id = %summary.pass_id,
            overloaded = summary.overloaded_nodes,
            balanced = summary.balanced,
            unresolved = summary.unresolved,
            transferred = summary.total_transferred,
            duration_ms = summary.duration_ms,
            "balancing pass complete"
        );
        Ok(summary)
    }

    fn relieve_overloads(
        &self,
        graph: &NetworkGraph,
        index: &mut NodeIndex,
    ) -> GridResult<(PassOutput, usize, usize)> {
        // Failed nodes are out of service and take no part in balancing
        let overloaded: Vec<_> = index
            .get_overloaded_nodes(self.cfg.overload_threshold)
            .into_iter()
            .filter(|node| !node.attrs.is_failed())
            .collect();
        let target = self.cfg.target_threshold;
        let mut out = PassOutput::default();
        let mut touched = BTreeSet::new();
        let mut edge_used: HashMap<EdgeHandle, f64> = HashMap::new();
        let mut unresolved = 0;

        for node in &overloaded {
            let Some(handle) = graph.handle(&node.node_id) else {
                warn!(node_id = %node.node_id, "indexed node missing from graph; skipped");
                continue;
            };

            // Eligible neighbors, least utilized first, ties by id
            let mut neighbors: Vec<(f64, String, EdgeHandle, f64)> = graph
                .active_edges_of(handle)
                .filter_map(|(eh, edge)| {
                    let id = graph.node_id(edge.other(handle));
                    let attrs = index.get(id)?;
                    (!attrs.is_failed() && attrs.headroom(target) > MIN_TRANSFER).then(|| {
                        (attrs.utilization(), id.to_string(), eh, edge.spec.capacity)
                    })
                })
                .collect();
            neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            let mut moved = 0.0;
            for (_, neighbor_id, eh, line_capacity) in &neighbors {
                let Some(source) = index.get(&node.node_id).cloned() else {
                    break;
                };
                let excess = source.excess(target);
                if excess <= MIN_TRANSFER {
                    break;
                }
                let Some(dest) = index.get(neighbor_id).cloned() else {
                    continue;
                };
                let used = edge_used.entry(*eh).or_insert(0.0);
                let amount = excess
                    .min(dest.headroom(target))
                    .min(line_capacity - *used);
                if amount <= MIN_TRANSFER {
                    continue;
                }

                index.update_load(&node.node_id, source.current_load - amount)?;
                index.update_load(neighbor_id, dest.current_load + amount)?;
                *used += amount;
                moved += amount;
                touched.insert(neighbor_id.clone());

                debug!(from = %node.node_id, to = %neighbor_id, amount, "load transferred");
                out.operations.push(BalancingOperation::new(
                    TransferKind::Balance,
                    node.node_id.clone(),
                    neighbor_id.clone(),
                    amount,
                    amount * (dest.efficiency - source.efficiency),
                ));
            }

            let after = index.search(&node.node_id)?.clone();
            let utilization = after.utilization();
            let data = if moved <= MIN_TRANSFER {
                unresolved += 1;
                EventData::OverloadUnresolved {
                    load: after.current_load,
                    capacity: after.capacity,
                    utilization,
                }
            } else if utilization > self.cfg.overload_threshold {
                EventData::OverloadDetected {
                    load: after.current_load,
                    capacity: after.capacity,
                    utilization,
                }
            } else {
                out.resolved.push(node.node_id.clone());
                EventData::OverloadResolved {
                    transferred: moved,
                    utilization,
                }
            };
            out.events.push(Event::new(node.node_id.clone(), data));
            if moved > MIN_TRANSFER {
                touched.insert(node.node_id.clone());
            }
        }

        out.touched = snapshot(index, &touched);
        Ok((out, overloaded.len(), unresolved))
    }

    /// Let efficient, under-used nodes pull up to a fifth of the load of
    /// less efficient neighbors, without pushing anyone past the target
    /// utilization.
    pub fn optimize_efficiency(&self) -> GridResult<OptimizationSummary> {
        let _pass = self
            .pass_guard
            .try_lock()
            .ok_or(GridError::BalancingInProgress)?;

        let (out, performed) = {
            let graph = self.graph.read();
            let mut index = self.index.write();
            self.attract_to_efficient(&graph, &mut index)?
        };

        self.publish(&out, TransferKind::Efficiency);
        let summary = OptimizationSummary {
            optimizations_performed: performed,
            total_efficiency_gain: out.operations.iter().map(|op| op.efficiency_gain).sum(),
            total_transferred: out.operations.iter().map(|op| op.amount).sum(),
            operations: out.operations,
        };
        info!(
            performed = summary.optimizations_performed,
            gain = summary.total_efficiency_gain,
            "efficiency pass complete"
        );
        Ok(summary)
    }

    fn attract_to_efficient(
        &self,
        graph: &NetworkGraph,
        index: &mut NodeIndex,
    ) -> GridResult<(PassOutput, usize)> {
        let target = self.cfg.target_threshold;
        let mut candidates: Vec<(String, f64)> = index
            .iter()
            .filter(|(_, a)| {
                !a.is_failed() && a.utilization() < UNDERUSED_UTILIZATION && a.efficiency > EFFICIENT_NODE
            })
            .map(|(id, a)| (id.to_string(), a.efficiency))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut out = PassOutput::default();
        let mut touched = BTreeSet::new();
        let mut edge_used: HashMap<EdgeHandle, f64> = HashMap::new();
        let mut performed = 0;

        for (target_id, _) in candidates {
            let Some(handle) = graph.handle(&target_id) else {
                continue;
            };
            let mut pulled = false;
            let edges: Vec<(EdgeHandle, String, f64)> = graph
                .active_edges_of(handle)
                .map(|(eh, e)| (eh, graph.node_id(e.other(handle)).to_string(), e.spec.capacity))
                .collect();

            for (eh, from_id, line_capacity) in edges {
                let Some(sink) = index.get(&target_id).cloned() else {
                    break;
                };
                let room = sink.headroom(target);
                if room <= MIN_TRANSFER {
                    break;
                }
                let Some(source) = index.get(&from_id).cloned() else {
                    continue;
                };
                if source.is_failed() || source.efficiency >= sink.efficiency {
                    continue;
                }
                let used = edge_used.entry(eh).or_insert(0.0);
                let amount = (source.current_load * MAX_ATTRACT_SHARE)
                    .min(room)
                    .min(line_capacity - *used);
                if amount <= MIN_TRANSFER {
                    continue;
                }

                index.update_load(&from_id, source.current_load - amount)?;
                index.update_load(&target_id, sink.current_load + amount)?;
                *used += amount;
                pulled = true;
                touched.insert(from_id.clone());
                touched.insert(target_id.clone());
                out.operations.push(BalancingOperation::new(
                    TransferKind::Efficiency,
                    from_id,
                    target_id.clone(),
                    amount,
                    amount * (sink.efficiency - source.efficiency),
                ));
            }
            if pulled {
                performed += 1;
            }
        }

        out.touched = snapshot(index, &touched);
        Ok((out, performed))
    }

    /// Commit, publish and record a finished pass; no locks held
    fn publish(&self, out: &PassOutput, kind: TransferKind) {
        for record in &out.touched {
            if let Err(e) = self.store.commit_node(record) {
                warn!(node_id = %record.node_id, error = %e, "failed to persist node");
            }
        }
        for op in &out.operations {
            if let Err(e) = self.store.commit_balancing(op) {
                warn!(operation_id = %op.id, %kind, error = %e, "failed to persist balancing operation");
            }
        }
        for event in &out.events {
            self.events.publish(event.clone());
        }
        let mut ledger = self.ledger.lock();
        ledger.passes += 1;
        ledger.record(&out.operations);
    }

    pub fn stats(&self) -> BalancingStats {
        let ledger = self.ledger.lock();
        BalancingStats {
            total_passes: ledger.passes,
            total_operations: ledger.operations,
            total_load_transferred: ledger.transferred,
            avg_transfer_per_operation: if ledger.operations == 0 {
                0.0
            } else {
                ledger.transferred / ledger.operations as f64
            },
            recent_operations: ledger.recent.iter().cloned().collect(),
        }
    }

    pub fn efficiency(&self) -> EfficiencyReport {
        calculate_efficiency(&self.index.read())
    }

    pub fn carbon_footprint(&self) -> CarbonReport {
        carbon_footprint(&self.index.read())
    }
}

fn snapshot(index: &NodeIndex, ids: &BTreeSet<String>) -> Vec<NodeRecord> {
    ids.iter()
        .filter_map(|id| index.get(id).map(|a| NodeRecord::new(id.clone(), a.clone())))
        .collect()
}
