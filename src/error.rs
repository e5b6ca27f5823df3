use thiserror::Error;

/// Recoverable errors surfaced by the grid core.
///
/// Every variant names the offending id and the operation that was attempted,
/// so the request-serving layer can map it to a response without re-deriving
/// context. Capacity limits are never reported here: balancing caps transfers
/// instead of failing them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    #[error("Validation error in {operation}: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },

    #[error("Node not found during {operation}: {node_id}")]
    NotFound {
        operation: &'static str,
        node_id: String,
    },

    #[error("Unknown node referenced by {operation}: {node_id}")]
    UnknownNode {
        operation: &'static str,
        node_id: String,
    },

    #[error("Duplicate key in {operation}: {key}")]
    DuplicateKey { operation: &'static str, key: String },

    #[error("Self-loop rejected in {operation}: {node_id} -> {node_id}")]
    SelfLoop {
        operation: &'static str,
        node_id: String,
    },

    #[error("{structure} is empty")]
    Empty { structure: &'static str },

    #[error("A balancing pass is already in progress")]
    BalancingInProgress,
}

pub type GridResult<T> = Result<T, GridError>;

impl GridError {
    pub(crate) fn validation(operation: &'static str, message: impl Into<String>) -> Self {
        GridError::Validation {
            operation,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(operation: &'static str, node_id: impl Into<String>) -> Self {
        GridError::NotFound {
            operation,
            node_id: node_id.into(),
        }
    }

    pub(crate) fn unknown_node(operation: &'static str, node_id: impl Into<String>) -> Self {
        GridError::UnknownNode {
            operation,
            node_id: node_id.into(),
        }
    }

    /// Stable error type string for callers that map errors onto responses
    pub fn error_type(&self) -> &'static str {
        match self {
            GridError::Validation { .. } => "ValidationError",
            GridError::NotFound { .. } => "NotFoundError",
            GridError::UnknownNode { .. } => "UnknownNodeError",
            GridError::DuplicateKey { .. } => "DuplicateKeyError",
            GridError::SelfLoop { .. } => "SelfLoopError",
            GridError::Empty { .. } => "EmptyError",
            GridError::BalancingInProgress => "BalancingInProgress",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        assert_eq!(
            GridError::not_found("search", "SUB_0").error_type(),
            "NotFoundError"
        );
        assert_eq!(
            GridError::Empty { structure: "event queue" }.error_type(),
            "EmptyError"
        );
        assert_eq!(GridError::BalancingInProgress.error_type(), "BalancingInProgress");
    }

    #[test]
    fn test_error_display_carries_context() {
        let error = GridError::unknown_node("add_edge", "TRF_9");
        assert_eq!(
            error.to_string(),
            "Unknown node referenced by add_edge: TRF_9"
        );

        let error = GridError::validation("update_load", "load must be >= 0, got -5");
        assert!(error.to_string().contains("update_load"));
        assert!(error.to_string().contains("-5"));
    }
}
