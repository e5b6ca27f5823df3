//! # Network Graph
//!
//! Undirected, weighted topology of the distribution network.
//!
//! Nodes and edges live in two parallel arenas addressed by integer handles.
//! Adjacency lists hold edge handles, never references, so cycles in the
//! topology are free of ownership concerns. Removed entries leave a vacant
//! slot behind; handles are never reissued within one graph.
//!
//! Every topology mutation bumps [`NetworkGraph::generation`], which
//! downstream caches compare against to detect staleness.

pub mod loss;
pub mod redundant;
pub mod shortest_path;

pub use redundant::*;
pub use shortest_path::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{EdgeRecord, EdgeSpec, EdgeStatus, NodeType, Position};
use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeHandle(u32);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub capacity: f64,
    pub position: Option<Position>,
    adjacency: Vec<EdgeHandle>,
}

impl GraphNode {
    pub fn degree(&self) -> usize {
        self.adjacency.len()
    }
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub a: NodeHandle,
    pub b: NodeHandle,
    pub spec: EdgeSpec,
    pub status: EdgeStatus,
}

impl GraphEdge {
    pub fn is_active(&self) -> bool {
        self.status == EdgeStatus::Active
    }

    /// The endpoint opposite `from`
    pub fn other(&self, from: NodeHandle) -> NodeHandle {
        if self.a == from {
            self.b
        } else {
            self.a
        }
    }
}

/// Edge weighting used by every routing query
///
/// weight = distance * (1 + resistance_factor * resistance), so shorter and
/// lower-resistance lines are preferred. Weights are always > 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub resistance_factor: f64,
    /// Per-unit-cost decay used for path reliability: exp(-decay * cost)
    pub reliability_decay: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            resistance_factor: 1.0,
            reliability_decay: 0.01,
        }
    }
}

impl CostModel {
    pub fn weight(&self, spec: &EdgeSpec) -> f64 {
        spec.distance * (1.0 + self.resistance_factor * spec.resistance)
    }

    /// Probability-like score in (0, 1], strictly decreasing in `cost`
    pub fn reliability(&self, cost: f64) -> f64 {
        (-self.reliability_decay * cost).exp()
    }
}

/// An active edge seen from one of its endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub node_id: String,
    pub edge: EdgeHandle,
    pub spec: EdgeSpec,
}

/// Topology summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub active_edges: usize,
    pub isolated_nodes: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    nodes: Vec<Option<GraphNode>>,
    edges: Vec<Option<GraphEdge>>,
    by_id: HashMap<String, NodeHandle>,
    cost: CostModel,
    node_count: usize,
    edge_count: usize,
    generation: u64,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost_model(cost: CostModel) -> Self {
        Self {
            cost,
            ..Self::default()
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Incremented on every topology mutation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn handle(&self, id: &str) -> Option<NodeHandle> {
        self.by_id.get(id).copied()
    }

    pub(crate) fn require(&self, operation: &'static str, id: &str) -> GridResult<NodeHandle> {
        self.handle(id)
            .ok_or_else(|| GridError::unknown_node(operation, id))
    }

    pub fn node(&self, handle: NodeHandle) -> &GraphNode {
        self.nodes[handle.index()]
            .as_ref()
            .expect("graph handle points at a removed node")
    }

    fn node_mut(&mut self, handle: NodeHandle) -> &mut GraphNode {
        self.nodes[handle.index()]
            .as_mut()
            .expect("graph handle points at a removed node")
    }

    pub fn edge(&self, handle: EdgeHandle) -> &GraphEdge {
        self.edges[handle.index()]
            .as_ref()
            .expect("adjacency list points at a removed edge")
    }

    pub fn node_id(&self, handle: NodeHandle) -> &str {
        &self.node(handle).id
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        node_type: NodeType,
        capacity: f64,
    ) -> GridResult<NodeHandle> {
        let id = id.into();
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(GridError::validation(
                "add_node",
                format!("capacity must be > 0, got {capacity}"),
            ));
        }
        if self.by_id.contains_key(&id) {
            return Err(GridError::DuplicateKey {
                operation: "add_node",
                key: id,
            });
        }
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(Some(GraphNode {
            id: id.clone(),
            node_type,
            capacity,
            position: None,
            adjacency: Vec::new(),
        }));
        self.by_id.insert(id, handle);
        self.node_count += 1;
        self.generation += 1;
        Ok(handle)
    }

    pub fn set_position(&mut self, id: &str, position: Position) -> GridResult<()> {
        let handle = self.require("set_position", id)?;
        self.node_mut(handle).position = Some(position);
        self.generation += 1;
        Ok(())
    }

    /// Remove a node and every edge touching it; returns the number of edges removed
    pub fn remove_node(&mut self, id: &str) -> GridResult<usize> {
        let handle = self.require("remove_node", id)?;
        let incident = self.node(handle).adjacency.clone();
        for eh in &incident {
            self.detach_edge(*eh);
        }
        self.nodes[handle.index()] = None;
        self.by_id.remove(id);
        self.node_count -= 1;
        self.generation += 1;
        Ok(incident.len())
    }

    pub fn add_edge(&mut self, a: &str, b: &str, spec: EdgeSpec) -> GridResult<EdgeHandle> {
        let ha = self.require("add_edge", a)?;
        let hb = self.require("add_edge", b)?;
        if ha == hb {
            return Err(GridError::SelfLoop {
                operation: "add_edge",
                node_id: a.to_string(),
            });
        }
        spec.validate("add_edge")?;
        if self.find_edge(ha, hb).is_some() {
            return Err(GridError::DuplicateKey {
                operation: "add_edge",
                key: format!("{a}<->{b}"),
            });
        }

        let handle = EdgeHandle(self.edges.len() as u32);
        self.edges.push(Some(GraphEdge {
            a: ha,
            b: hb,
            spec,
            status: EdgeStatus::Active,
        }));
        self.node_mut(ha).adjacency.push(handle);
        self.node_mut(hb).adjacency.push(handle);
        self.edge_count += 1;
        self.generation += 1;
        Ok(handle)
    }

    pub fn remove_edge(&mut self, a: &str, b: &str) -> GridResult<()> {
        let eh = self.require_edge("remove_edge", a, b)?;
        self.detach_edge(eh);
        self.generation += 1;
        Ok(())
    }

    /// Change a line's status; returns the previous status
    pub fn set_edge_status(&mut self, a: &str, b: &str, status: EdgeStatus) -> GridResult<EdgeStatus> {
        let eh = self.require_edge("set_edge_status", a, b)?;
        let edge = self.edges[eh.index()]
            .as_mut()
            .expect("adjacency list points at a removed edge");
        let previous = std::mem::replace(&mut edge.status, status);
        if previous != status {
            self.generation += 1;
        }
        Ok(previous)
    }

    /// Every edge touching `id`, whatever its status
    pub fn incident_edges(&self, id: &str) -> GridResult<Vec<EdgeRecord>> {
        let handle = self.require("incident_edges", id)?;
        Ok(self
            .node(handle)
            .adjacency
            .iter()
            .map(|eh| self.record(self.edge(*eh)))
            .collect())
    }

    fn record(&self, e: &GraphEdge) -> EdgeRecord {
        EdgeRecord {
            from: self.node_id(e.a).to_string(),
            to: self.node_id(e.b).to_string(),
            spec: e.spec,
            status: e.status,
        }
    }

    pub fn edge_between(&self, a: &str, b: &str) -> Option<&GraphEdge> {
        let (ha, hb) = (self.handle(a)?, self.handle(b)?);
        self.find_edge(ha, hb).map(|eh| self.edge(eh))
    }

    pub(crate) fn find_edge(&self, a: NodeHandle, b: NodeHandle) -> Option<EdgeHandle> {
        self.node(a)
            .adjacency
            .iter()
            .copied()
            .find(|eh| self.edge(*eh).other(a) == b)
    }

    fn require_edge(&self, operation: &'static str, a: &str, b: &str) -> GridResult<EdgeHandle> {
        let ha = self.require(operation, a)?;
        let hb = self.require(operation, b)?;
        self.find_edge(ha, hb)
            .ok_or_else(|| GridError::not_found(operation, format!("{a}<->{b}")))
    }

    fn detach_edge(&mut self, eh: EdgeHandle) {
        let edge = self.edges[eh.index()]
            .take()
            .expect("detached an already removed edge");
        for end in [edge.a, edge.b] {
            self.node_mut(end).adjacency.retain(|h| *h != eh);
        }
        self.edge_count -= 1;
    }

    /// Active edges leaving `handle`, in insertion order
    pub(crate) fn active_edges_of(
        &self,
        handle: NodeHandle,
    ) -> impl Iterator<Item = (EdgeHandle, &GraphEdge)> + '_ {
        self.node(handle)
            .adjacency
            .iter()
            .map(move |eh| (*eh, self.edge(*eh)))
            .filter(|(_, e)| e.is_active())
    }

    /// Neighbors reachable over active edges
    pub fn active_neighbors(&self, id: &str) -> GridResult<Vec<Neighbor>> {
        let handle = self.require("active_neighbors", id)?;
        Ok(self
            .active_edges_of(handle)
            .map(|(eh, e)| Neighbor {
                node_id: self.node_id(e.other(handle)).to_string(),
                edge: eh,
                spec: e.spec,
            })
            .collect())
    }

    pub fn weight(&self, edge: &GraphEdge) -> f64 {
        self.cost.weight(&edge.spec)
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeRecord> + '_ {
        self.edges.iter().flatten().map(|e| self.record(e))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes.iter().flatten()
    }

    pub fn network_stats(&self) -> NetworkStats {
        NetworkStats {
            node_count: self.node_count,
            edge_count: self.edge_count,
            active_edges: self.edges.iter().flatten().filter(|e| e.is_active()).count(),
            isolated_nodes: self.nodes().filter(|n| n.adjacency.is_empty()).count(),
            generation: self.generation,
        }
    }
}
