use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Why load was moved between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferKind {
    /// Relieving an overloaded node
    Balance,
    /// Shifting load toward a more efficient node
    Efficiency,
}

/// Audit record of one load transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancingOperation {
    pub id: Uuid,
    pub kind: TransferKind,
    pub from: String,
    pub to: String,
    /// kW moved
    pub amount: f64,
    /// amount * (efficiency_to - efficiency_from); negative when moving to a less efficient node
    pub efficiency_gain: f64,
    pub timestamp: DateTime<Utc>,
}

impl BalancingOperation {
    pub fn new(
        kind: TransferKind,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: f64,
        efficiency_gain: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            from: from.into(),
            to: to.into(),
            amount,
            efficiency_gain,
            timestamp: Utc::now(),
        }
    }
}
