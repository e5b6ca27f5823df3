use rand::Rng;

use crate::controller::Topology;
use crate::domain::{EdgeSpec, NodeAttrs, NodeType, DEFAULT_LINE_CAPACITY};

pub const SUBSTATIONS: usize = 3;
pub const TRANSFORMERS: usize = 7;

/// Three-tier sample network
///
/// Substations (5000 kW, 95%) are fully meshed with transformers
/// (2000 kW, 90%); consumers (200-800 kW, 85%) hang off transformers
/// round-robin. Initial loads sit well below capacity for the upper tiers
/// and anywhere in 30-90% for consumers.
pub fn sample_network(consumers: usize, seed: Option<u64>) -> Topology {
    use rand::SeedableRng;

    let mut rng = match seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    let mut topology = Topology::default();

    let substations: Vec<String> = (0..SUBSTATIONS).map(|i| format!("SUB_{i}")).collect();
    for id in &substations {
        let attrs = NodeAttrs::new(NodeType::Substation, 5000.0)
            .with_efficiency(0.95)
            .with_load(rng.gen_range(2000.0..4000.0));
        topology.nodes.push((id.clone(), attrs));
    }

    let transformers: Vec<String> = (0..TRANSFORMERS).map(|i| format!("TRF_{i}")).collect();
    for id in &transformers {
        let attrs = NodeAttrs::new(NodeType::Transformer, 2000.0)
            .with_efficiency(0.90)
            .with_load(rng.gen_range(800.0..1600.0));
        topology.nodes.push((id.clone(), attrs));
    }

    for i in 0..consumers {
        let capacity = rng.gen_range(200.0..800.0);
        let attrs = NodeAttrs::new(NodeType::Consumer, capacity)
            .with_efficiency(0.85)
            .with_load(rng.gen_range(capacity * 0.3..capacity * 0.9));
        topology.nodes.push((format!("CONS_{i}"), attrs));
    }

    for sub in &substations {
        for trf in &transformers {
            let spec = EdgeSpec::new(rng.gen_range(5.0..20.0), 0.05, DEFAULT_LINE_CAPACITY);
            topology.edges.push((sub.clone(), trf.clone(), spec));
        }
    }
    for i in 0..consumers {
        let trf = &transformers[i % TRANSFORMERS];
        let spec = EdgeSpec::new(rng.gen_range(1.0..10.0), 0.1, DEFAULT_LINE_CAPACITY);
        topology.edges.push((trf.clone(), format!("CONS_{i}"), spec));
    }

    topology
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_shape() {
        let t = sample_network(14, Some(42));
        assert_eq!(t.nodes.len(), SUBSTATIONS + TRANSFORMERS + 14);
        assert_eq!(t.edges.len(), SUBSTATIONS * TRANSFORMERS + 14);
        assert!(t.nodes.iter().all(|(_, a)| a.current_load < a.capacity));
        let feeders: Vec<&str> = t
            .edges
            .iter()
            .filter(|(_, to, _)| to == "CONS_7")
            .map(|(from, _, _)| from.as_str())
            .collect();
        assert_eq!(feeders, vec!["TRF_0"]);
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = sample_network(5, Some(1));
        let b = sample_network(5, Some(1));
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.edges, b.edges);
    }
}
