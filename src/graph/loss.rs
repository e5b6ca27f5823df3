//! Resistive line losses
//!
//! Current on a line is approximated as `load / voltage`; each edge then
//! dissipates I² · R · distance.

use super::{GraphEdge, NetworkGraph};
use crate::error::{GridError, GridResult};

/// Loss on a single line carrying `load` at `voltage`
pub fn edge_loss(edge: &GraphEdge, load: f64, voltage: f64) -> f64 {
    let current = load / voltage;
    current * current * edge.spec.resistance * edge.spec.distance
}

impl NetworkGraph {
    /// Total resistive loss when `load` flows along `path`
    ///
    /// Paths with fewer than two nodes lose nothing. Consecutive ids must be
    /// joined by an edge.
    pub fn power_loss(&self, path: &[String], load: f64, voltage: f64) -> GridResult<f64> {
        if !(voltage.is_finite() && voltage > 0.0) {
            return Err(GridError::validation(
                "power_loss",
                format!("voltage must be > 0, got {voltage}"),
            ));
        }
        let mut total = 0.0;
        for pair in path.windows(2) {
            let edge = self.edge_between(&pair[0], &pair[1]).ok_or_else(|| {
                GridError::validation(
                    "power_loss",
                    format!("no line between {} and {}", pair[0], pair[1]),
                )
            })?;
            total += edge_loss(edge, load, voltage);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeSpec, NodeType};

    fn pair() -> NetworkGraph {
        let mut g = NetworkGraph::new();
        g.add_node("A", NodeType::Substation, 1000.0).unwrap();
        g.add_node("B", NodeType::Transformer, 1000.0).unwrap();
        g.add_node("C", NodeType::Consumer, 1000.0).unwrap();
        g.add_edge("A", "B", EdgeSpec::new(10.0, 0.05, 1000.0)).unwrap();
        g.add_edge("B", "C", EdgeSpec::new(2.0, 0.1, 1000.0)).unwrap();
        g
    }

    #[test]
    fn test_loss_along_path() {
        let g = pair();
        let path: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let loss = g.power_loss(&path, 440.0, 220.0).unwrap();
        // I = 2 A; 4 * (0.05 * 10 + 0.1 * 2)
        assert!((loss - 2.8).abs() < 1e-9);
    }

    #[test]
    fn test_trivial_and_broken_paths() {
        let g = pair();
        assert_eq!(g.power_loss(&["A".to_string()], 500.0, 220.0).unwrap(), 0.0);
        let broken = vec!["A".to_string(), "C".to_string()];
        assert!(g.power_loss(&broken, 500.0, 220.0).is_err());
        let ok = vec!["A".to_string(), "B".to_string()];
        assert!(g.power_loss(&ok, 500.0, 0.0).is_err());
    }
}
