use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{GridError, GridResult};

/// Default transmission line capacity (kW) when none is given
pub const DEFAULT_LINE_CAPACITY: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeStatus {
    Active,
    Maintenance,
    Failed,
}

/// Physical parameters of a transmission line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Line length (km)
    pub distance: f64,
    /// Resistance per unit length (ohm/km)
    pub resistance: f64,
    /// Maximum transferable load (kW)
    pub capacity: f64,
}

impl EdgeSpec {
    pub fn new(distance: f64, resistance: f64, capacity: f64) -> Self {
        Self {
            distance,
            resistance,
            capacity,
        }
    }

    pub(crate) fn validate(&self, operation: &'static str) -> GridResult<()> {
        if !(self.distance.is_finite() && self.distance > 0.0) {
            return Err(GridError::validation(
                operation,
                format!("distance must be > 0, got {}", self.distance),
            ));
        }
        if !(self.resistance.is_finite() && self.resistance >= 0.0) {
            return Err(GridError::validation(
                operation,
                format!("resistance must be >= 0, got {}", self.resistance),
            ));
        }
        if !(self.capacity.is_finite() && self.capacity > 0.0) {
            return Err(GridError::validation(
                operation,
                format!("capacity must be > 0, got {}", self.capacity),
            ));
        }
        Ok(())
    }
}

impl Default for EdgeSpec {
    fn default() -> Self {
        Self {
            distance: 1.0,
            resistance: 0.1,
            capacity: DEFAULT_LINE_CAPACITY,
        }
    }
}

/// Serializable view of an edge between two named nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub spec: EdgeSpec,
    pub status: EdgeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_spec_validation() {
        assert!(EdgeSpec::new(0.0, 0.1, 100.0).validate("add_edge").is_err());
        assert!(EdgeSpec::new(1.0, -0.1, 100.0).validate("add_edge").is_err());
        assert!(EdgeSpec::new(1.0, 0.1, 0.0).validate("add_edge").is_err());
        assert!(EdgeSpec::new(1.0, 0.0, 100.0).validate("add_edge").is_ok());
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!("maintenance".parse::<EdgeStatus>().unwrap(), EdgeStatus::Maintenance);
        assert_eq!(EdgeStatus::Failed.to_string(), "failed");
    }
}
