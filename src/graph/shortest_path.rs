use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use super::{EdgeHandle, NetworkGraph, NodeHandle};
use crate::error::GridResult;

/// Lower bound on the remaining cost from `node` to `target`
///
/// A* only returns optimal routes when the estimate never exceeds the true
/// remaining cost (admissible) and never drops by more than an edge weight
/// across one hop (consistent). Callers must ensure this for their cost
/// model; [`EuclideanHeuristic::is_admissible_for`] checks it for the
/// straight-line estimate.
pub trait Heuristic {
    fn estimate(&self, graph: &NetworkGraph, node: NodeHandle, target: NodeHandle) -> f64;
}

/// Always 0; turns A* into Dijkstra
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroHeuristic;

impl Heuristic for ZeroHeuristic {
    fn estimate(&self, _: &NetworkGraph, _: NodeHandle, _: NodeHandle) -> f64 {
        0.0
    }
}

/// Straight-line distance between node positions, 0 when either is unplaced
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanHeuristic;

impl Heuristic for EuclideanHeuristic {
    fn estimate(&self, graph: &NetworkGraph, node: NodeHandle, target: NodeHandle) -> f64 {
        match (graph.node(node).position, graph.node(target).position) {
            (Some(p), Some(q)) => p.distance_to(&q),
            _ => 0.0,
        }
    }
}

impl EuclideanHeuristic {
    /// True when every edge weighs at least the straight-line gap between
    /// its endpoints, which makes the estimate consistent.
    ///
    /// A partly placed graph never qualifies: a route through unplaced nodes
    /// can be cheaper than the straight-line estimate of a placed node.
    pub fn is_admissible_for(graph: &NetworkGraph) -> bool {
        let placed = graph.nodes.iter().flatten().filter(|n| n.position.is_some()).count();
        if placed != 0 && placed != graph.node_count {
            return false;
        }
        graph.edges.iter().flatten().all(|edge| {
            let gap = EuclideanHeuristic.estimate(graph, edge.a, edge.b);
            graph.weight(edge) + 1e-9 >= gap
        })
    }
}

/// Result of a single-pair search. Unreachable targets yield an empty path
/// and an infinite cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortestPath {
    pub path: Vec<String>,
    pub cost: f64,
    /// Nodes settled before the search stopped
    pub explored: usize,
}

impl ShortestPath {
    pub fn unreachable(explored: usize) -> Self {
        Self {
            path: Vec::new(),
            cost: f64::INFINITY,
            explored,
        }
    }

    pub fn is_reachable(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

/// Nodes and edges a search must not traverse
#[derive(Debug, Default)]
pub(crate) struct Exclusions {
    pub nodes: HashSet<NodeHandle>,
    pub edges: HashSet<EdgeHandle>,
}

pub(crate) struct Found {
    pub path: Vec<NodeHandle>,
    pub cost: f64,
}

impl NetworkGraph {
    /// Minimum-cost route over active edges
    pub fn dijkstra(&self, source: &str, target: &str) -> GridResult<ShortestPath> {
        self.astar(source, target, &ZeroHeuristic)
    }

    /// Minimum-cost route guided by `heuristic`
    ///
    /// Returns the same cost as [`NetworkGraph::dijkstra`] as long as the
    /// heuristic is admissible and consistent.
    pub fn astar<H: Heuristic + ?Sized>(
        &self,
        source: &str,
        target: &str,
        heuristic: &H,
    ) -> GridResult<ShortestPath> {
        let s = self.require("find_route", source)?;
        let t = self.require("find_route", target)?;
        let (found, explored) = self.best_first(s, t, heuristic, None);
        Ok(match found {
            Some(found) => ShortestPath {
                path: self.ids(&found.path),
                cost: found.cost,
                explored,
            },
            None => ShortestPath::unreachable(explored),
        })
    }

    pub(crate) fn ids(&self, path: &[NodeHandle]) -> Vec<String> {
        path.iter().map(|h| self.node_id(*h).to_string()).collect()
    }

    /// Label-setting search shared by Dijkstra, A* and the spur searches of
    /// the k-path enumeration.
    ///
    /// Frontier entries are ordered by (estimated total, insertion sequence),
    /// and a label only improves on a strictly smaller cost, so among equal
    /// cost routes the first one discovered wins.
    pub(crate) fn best_first<H: Heuristic + ?Sized>(
        &self,
        source: NodeHandle,
        target: NodeHandle,
        heuristic: &H,
        exclusions: Option<&Exclusions>,
    ) -> (Option<Found>, usize) {
        let slots = self.slot_count();
        let mut cost = vec![f64::INFINITY; slots];
        let mut prev: Vec<Option<NodeHandle>> = vec![None; slots];
        let mut settled = vec![false; slots];
        let mut frontier = BinaryHeap::new();
        let mut seq = 0u64;
        let mut explored = 0;

        cost[source.index()] = 0.0;
        frontier.push(Reverse((
            OrderedFloat(heuristic.estimate(self, source, target)),
            seq,
            source,
        )));

        while let Some(Reverse((_, _, u))) = frontier.pop() {
            if settled[u.index()] {
                continue;
            }
            settled[u.index()] = true;
            explored += 1;
            if u == target {
                break;
            }

            for (eh, edge) in self.active_edges_of(u) {
                let v = edge.other(u);
                if settled[v.index()] {
                    continue;
                }
                if let Some(ex) = exclusions {
                    if ex.edges.contains(&eh) || ex.nodes.contains(&v) {
                        continue;
                    }
                }
                let candidate = cost[u.index()] + self.weight(edge);
                if candidate < cost[v.index()] {
                    cost[v.index()] = candidate;
                    prev[v.index()] = Some(u);
                    seq += 1;
                    let priority = candidate + heuristic.estimate(self, v, target);
                    frontier.push(Reverse((OrderedFloat(priority), seq, v)));
                }
            }
        }

        if !settled[target.index()] {
            return (None, explored);
        }

        let mut path = vec![target];
        let mut cursor = target;
        while let Some(p) = prev[cursor.index()] {
            path.push(p);
            cursor = p;
        }
        path.reverse();
        let found = Found {
            path,
            cost: cost[target.index()],
        };
        (Some(found), explored)
    }
}
