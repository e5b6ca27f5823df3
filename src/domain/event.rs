use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Event urgency, 1 (most urgent) to 5 (informational)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Priority {
    /// Imminent blackout
    Critical = 1,
    /// Severe overload
    High = 2,
    /// Moderate overload
    Medium = 3,
    /// Warning
    Low = 4,
    /// Informational
    Info = 5,
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Critical),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Medium),
            4 => Ok(Priority::Low),
            5 => Ok(Priority::Info),
            other => Err(format!("priority must be within 1..=5, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    OverloadDetected,
    OverloadResolved,
    OverloadUnresolved,
    Failure,
    Recovery,
    Maintenance,
}

/// Payload of an operational event, one fixed field set per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    OverloadDetected {
        load: f64,
        capacity: f64,
        utilization: f64,
    },
    OverloadResolved {
        transferred: f64,
        utilization: f64,
    },
    OverloadUnresolved {
        load: f64,
        capacity: f64,
        utilization: f64,
    },
    Failure {
        previous_load: f64,
        failed_edges: usize,
        duration_hours: f64,
    },
    Recovery {
        restored_edges: usize,
    },
    Maintenance {
        from: String,
        to: String,
    },
}

impl EventData {
    pub fn kind(&self) -> EventKind {
        match self {
            EventData::OverloadDetected { .. } => EventKind::OverloadDetected,
            EventData::OverloadResolved { .. } => EventKind::OverloadResolved,
            EventData::OverloadUnresolved { .. } => EventKind::OverloadUnresolved,
            EventData::Failure { .. } => EventKind::Failure,
            EventData::Recovery { .. } => EventKind::Recovery,
            EventData::Maintenance { .. } => EventKind::Maintenance,
        }
    }

    /// Urgency assigned to this payload at creation time
    pub fn priority(&self) -> Priority {
        match self {
            EventData::Failure { .. } => Priority::Critical,
            EventData::OverloadUnresolved { .. } => Priority::High,
            EventData::OverloadDetected { utilization, .. } if *utilization >= 1.0 => {
                Priority::High
            }
            EventData::OverloadDetected { .. } => Priority::Medium,
            EventData::Maintenance { .. } | EventData::OverloadResolved { .. } => Priority::Low,
            EventData::Recovery { .. } => Priority::Info,
        }
    }
}

/// Operational event. Priority is fixed when the event is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub node_id: String,
    priority: Priority,
    pub data: EventData,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(node_id: impl Into<String>, data: EventData) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.into(),
            priority: data.priority(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn kind(&self) -> EventKind {
        self.data.kind()
    }
}
