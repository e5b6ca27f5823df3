use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::shortest_path::{Exclusions, ZeroHeuristic};
use super::{NetworkGraph, NodeHandle};
use crate::error::{GridError, GridResult};

/// One of up to k loop-free routes between a pair of nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundantPath {
    /// 1-based rank, cheapest first
    pub path_id: usize,
    pub nodes: Vec<String>,
    pub cost: f64,
    /// exp(-decay * cost); strictly decreasing in cost
    pub reliability: f64,
}

impl RedundantPath {
    pub fn hops(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

impl NetworkGraph {
    /// Up to `k` distinct loop-free routes in non-decreasing cost order
    ///
    /// Deviation-based enumeration: each accepted route spawns candidates by
    /// forcing a different edge at every prefix. Routes are distinct as node
    /// sequences. Fewer than `k` are returned when the topology has fewer.
    pub fn find_k_redundant_paths(
        &self,
        source: &str,
        target: &str,
        k: usize,
    ) -> GridResult<Vec<RedundantPath>> {
        if k == 0 {
            return Err(GridError::validation(
                "find_redundant_paths",
                "k must be >= 1",
            ));
        }
        let s = self.require("find_redundant_paths", source)?;
        let t = self.require("find_redundant_paths", target)?;

        let mut accepted: Vec<(Vec<NodeHandle>, f64)> = Vec::new();
        let (first, _) = self.best_first(s, t, &ZeroHeuristic, None);
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        accepted.push((first.path, first.cost));

        let mut seen: HashSet<Vec<NodeHandle>> = HashSet::new();
        seen.insert(accepted[0].0.clone());
        let mut candidates: Vec<(Vec<NodeHandle>, f64)> = Vec::new();

        while accepted.len() < k {
            let (last, _) = accepted[accepted.len() - 1].clone();

            for spur_at in 0..last.len().saturating_sub(1) {
                let spur = last[spur_at];
                let root = &last[..=spur_at];

                let mut exclusions = Exclusions::default();
                for (path, _) in &accepted {
                    if path.len() > spur_at + 1 && &path[..=spur_at] == root {
                        if let Some(eh) = self.find_edge(path[spur_at], path[spur_at + 1]) {
                            exclusions.edges.insert(eh);
                        }
                    }
                }
                exclusions.nodes.extend(root[..spur_at].iter().copied());

                let (found, _) = self.best_first(spur, t, &ZeroHeuristic, Some(&exclusions));
                let Some(found) = found else {
                    continue;
                };

                let mut path = root[..spur_at].to_vec();
                path.extend(found.path);
                if seen.insert(path.clone()) {
                    let cost = self.path_cost(&path);
                    candidates.push((path, cost));
                }
            }

            // first minimum wins, which keeps enumeration order stable
            let best = candidates
                .iter()
                .enumerate()
                .min_by_key(|(_, (path, cost))| (OrderedFloat(*cost), path.len()))
                .map(|(i, _)| i);
            match best {
                Some(i) => accepted.push(candidates.remove(i)),
                None => break,
            }
        }

        let model = self.cost_model();
        Ok(accepted
            .into_iter()
            .enumerate()
            .map(|(i, (path, cost))| RedundantPath {
                path_id: i + 1,
                nodes: self.ids(&path),
                cost,
                reliability: model.reliability(cost),
            })
            .collect())
    }

    /// Sum of edge weights along consecutive handles
    pub(crate) fn path_cost(&self, path: &[NodeHandle]) -> f64 {
        path.windows(2)
            .filter_map(|pair| self.find_edge(pair[0], pair[1]))
            .map(|eh| self.weight(self.edge(eh)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeSpec, EdgeStatus, NodeType};
    use rstest::rstest;

    /// A ladder with three disjoint-ish routes from S to T
    fn ladder() -> NetworkGraph {
        let mut g = NetworkGraph::new();
        for id in ["S", "A", "B", "C", "T"] {
            g.add_node(id, NodeType::Transformer, 100.0).unwrap();
        }
        for (a, b, d) in [
            ("S", "A", 1.0),
            ("A", "T", 1.0),
            ("S", "B", 2.0),
            ("B", "T", 2.0),
            ("S", "C", 3.0),
            ("C", "T", 3.0),
            ("A", "B", 1.0),
        ] {
            g.add_edge(a, b, EdgeSpec::new(d, 0.0, 100.0)).unwrap();
        }
        g
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(6)]
    fn test_paths_are_distinct_and_sorted(#[case] k: usize) {
        let g = ladder();
        let paths = g.find_k_redundant_paths("S", "T", k).unwrap();
        assert!(!paths.is_empty());
        assert!(paths.len() <= k);

        let unique: HashSet<_> = paths.iter().map(|p| p.nodes.clone()).collect();
        assert_eq!(unique.len(), paths.len());

        for pair in paths.windows(2) {
            assert!(pair[0].cost <= pair[1].cost + 1e-9);
            assert!(pair[0].reliability >= pair[1].reliability);
        }
        for (i, p) in paths.iter().enumerate() {
            assert_eq!(p.path_id, i + 1);
            assert_eq!(p.nodes.first().map(String::as_str), Some("S"));
            assert_eq!(p.nodes.last().map(String::as_str), Some("T"));
            let set: HashSet<_> = p.nodes.iter().collect();
            assert_eq!(set.len(), p.nodes.len(), "path has a loop: {:?}", p.nodes);
        }
    }

    #[test]
    fn test_cheapest_first() {
        let g = ladder();
        let paths = g.find_k_redundant_paths("S", "T", 3).unwrap();
        assert_eq!(paths[0].nodes, vec!["S", "A", "T"]);
        assert!((paths[0].cost - 2.0).abs() < 1e-9);
        assert!((paths[1].cost - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_fewer_paths_than_requested() {
        let mut g = NetworkGraph::new();
        for id in ["A", "B"] {
            g.add_node(id, NodeType::Consumer, 10.0).unwrap();
        }
        g.add_edge("A", "B", EdgeSpec::new(1.0, 0.0, 10.0)).unwrap();
        let paths = g.find_k_redundant_paths("A", "B", 5).unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_unreachable_and_invalid_k() {
        let mut g = ladder();
        g.add_node("X", NodeType::Consumer, 10.0).unwrap();
        assert!(g.find_k_redundant_paths("S", "X", 3).unwrap().is_empty());
        assert!(matches!(
            g.find_k_redundant_paths("S", "T", 0),
            Err(GridError::Validation { .. })
        ));
    }

    #[test]
    fn test_failed_lines_are_not_used() {
        let mut g = ladder();
        g.set_edge_status("S", "A", EdgeStatus::Failed).unwrap();
        let paths = g.find_k_redundant_paths("S", "T", 10).unwrap();
        assert!(paths
            .iter()
            .all(|p| !p.nodes.windows(2).any(|w| w[0] == "S" && w[1] == "A")));
    }
}
