use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{GridError, GridResult};

/// Utilization at or below which a node is considered healthy
pub const WARNING_UTILIZATION: f64 = 0.7;
/// Utilization above which a node is overloaded
pub const OVERLOAD_UTILIZATION: f64 = 0.9;
/// Nominal low-voltage level used when a node has no explicit voltage
pub const DEFAULT_VOLTAGE_V: f64 = 220.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    Substation,
    Transformer,
    Consumer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Warning,
    Overloaded,
    Failed,
}

impl NodeStatus {
    /// Status band for a utilization ratio (load / capacity)
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization <= WARNING_UTILIZATION {
            NodeStatus::Active
        } else if utilization <= OVERLOAD_UTILIZATION {
            NodeStatus::Warning
        } else {
            NodeStatus::Overloaded
        }
    }
}

/// Planar coordinates of a node, in the same unit as edge distances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Electrical attributes of a network node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttrs {
    pub node_type: NodeType,
    /// Rated capacity (kW)
    pub capacity: f64,
    /// Present load (kW), may exceed capacity but never negative
    pub current_load: f64,
    /// Conversion efficiency (0.0-1.0)
    pub efficiency: f64,
    /// Operating voltage (V)
    pub voltage: f64,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeAttrs {
    pub fn new(node_type: NodeType, capacity: f64) -> Self {
        Self {
            node_type,
            capacity,
            current_load: 0.0,
            efficiency: 1.0,
            voltage: DEFAULT_VOLTAGE_V,
            status: NodeStatus::Active,
            position: None,
        }
    }

    pub fn with_load(mut self, load: f64) -> Self {
        self.current_load = load;
        self.refresh_status();
        self
    }

    pub fn with_efficiency(mut self, efficiency: f64) -> Self {
        self.efficiency = efficiency;
        self
    }

    pub fn with_voltage(mut self, voltage: f64) -> Self {
        self.voltage = voltage;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn utilization(&self) -> f64 {
        self.current_load / self.capacity
    }

    /// Load that can still be accepted before reaching `threshold` utilization
    pub fn headroom(&self, threshold: f64) -> f64 {
        (self.capacity * threshold - self.current_load).max(0.0)
    }

    /// Load above `threshold` utilization
    pub fn excess(&self, threshold: f64) -> f64 {
        (self.current_load - self.capacity * threshold).max(0.0)
    }

    pub fn is_failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }

    /// Recompute the derived status band. A failed node stays failed until it
    /// is explicitly recovered.
    pub fn refresh_status(&mut self) {
        if !self.is_failed() {
            self.status = NodeStatus::from_utilization(self.utilization());
        }
    }

    pub(crate) fn validate(&self, operation: &'static str) -> GridResult<()> {
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(GridError::validation(
                operation,
                format!("capacity must be > 0, got {}", self.capacity),
            ));
        }
        validate_load(operation, self.current_load)?;
        if !(0.0..=1.0).contains(&self.efficiency) {
            return Err(GridError::validation(
                operation,
                format!("efficiency must be within 0..1, got {}", self.efficiency),
            ));
        }
        if !(self.voltage.is_finite() && self.voltage > 0.0) {
            return Err(GridError::validation(
                operation,
                format!("voltage must be > 0, got {}", self.voltage),
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_load(operation: &'static str, load: f64) -> GridResult<()> {
    if !load.is_finite() || load < 0.0 {
        return Err(GridError::validation(
            operation,
            format!("load must be a finite value >= 0, got {load}"),
        ));
    }
    Ok(())
}

/// Flat view of a node, as listed to callers and mirrored to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
    pub utilization: f64,
}

impl NodeRecord {
    pub fn new(node_id: impl Into<String>, attrs: NodeAttrs) -> Self {
        let utilization = attrs.utilization();
        Self {
            node_id: node_id.into(),
            attrs,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, NodeStatus::Active)]
    #[case(0.7, NodeStatus::Active)]
    #[case(0.75, NodeStatus::Warning)]
    #[case(0.9, NodeStatus::Warning)]
    #[case(0.95, NodeStatus::Overloaded)]
    #[case(1.4, NodeStatus::Overloaded)]
    fn test_status_bands(#[case] utilization: f64, #[case] expected: NodeStatus) {
        assert_eq!(NodeStatus::from_utilization(utilization), expected);
    }

    #[test]
    fn test_failed_status_is_sticky() {
        let mut attrs = NodeAttrs::new(NodeType::Consumer, 100.0).with_load(50.0);
        attrs.status = NodeStatus::Failed;
        attrs.current_load = 10.0;
        attrs.refresh_status();
        assert_eq!(attrs.status, NodeStatus::Failed);
    }

    #[test]
    fn test_headroom_and_excess() {
        let attrs = NodeAttrs::new(NodeType::Transformer, 1000.0).with_load(950.0);
        assert!((attrs.excess(0.8) - 150.0).abs() < 1e-9);
        assert_eq!(attrs.headroom(0.8), 0.0);

        let attrs = NodeAttrs::new(NodeType::Transformer, 1000.0).with_load(400.0);
        assert!((attrs.headroom(0.8) - 400.0).abs() < 1e-9);
        assert_eq!(attrs.excess(0.8), 0.0);
    }

    #[test]
    fn test_validation() {
        assert!(NodeAttrs::new(NodeType::Consumer, 0.0).validate("insert").is_err());
        assert!(NodeAttrs::new(NodeType::Consumer, 10.0)
            .with_efficiency(1.5)
            .validate("insert")
            .is_err());
        assert!(validate_load("update_load", -1.0).is_err());
        assert!(validate_load("update_load", f64::NAN).is_err());
        assert!(NodeAttrs::new(NodeType::Consumer, 10.0).validate("insert").is_ok());
    }

    #[test]
    fn test_node_type_parse() {
        assert_eq!("substation".parse::<NodeType>().unwrap(), NodeType::Substation);
        assert_eq!(NodeType::Consumer.to_string(), "consumer");
    }
}
