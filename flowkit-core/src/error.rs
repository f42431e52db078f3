use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error in '{node}': {cause}")]
    Execution { node: String, cause: String },

    #[error("{} of {total} branches failed in '{node}': {}", .failures.len(), summarize(.failures))]
    Aggregate { node: String, total: usize, failures: Vec<NodeFailure> },

    #[error("Run cancelled while '{node}' was executing")]
    Cancelled { node: String },

    #[error("'{node}' did not finish within {after:?}")]
    Timeout { node: String, after: Duration },

    #[error("Connector error: {0}")]
    Connector(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One failed branch of a parallel phase.
#[derive(Debug)]
pub struct NodeFailure {
    pub node: String,
    pub error: FlowError,
}

fn summarize(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("[{}] {}", failure.node, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl FlowError {
    /// Shorthand for an execution failure attributed to `node`.
    pub fn execution(node: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Execution { node: node.into(), cause: cause.to_string() }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Name of the node the error is attributed to, when there is one.
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            Self::Execution { node, .. }
            | Self::Aggregate { node, .. }
            | Self::Cancelled { node }
            | Self::Timeout { node, .. } => Some(node),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlowError::execution("drafting", "backend unavailable");
        assert_eq!(err.to_string(), "Execution error in 'drafting': backend unavailable");
    }

    #[test]
    fn test_aggregate_display_lists_every_failure() {
        let err = FlowError::Aggregate {
            node: "research".to_string(),
            total: 3,
            failures: vec![
                NodeFailure {
                    node: "overview".to_string(),
                    error: FlowError::execution("overview", "boom"),
                },
                NodeFailure {
                    node: "examples".to_string(),
                    error: FlowError::Timeout {
                        node: "examples".to_string(),
                        after: Duration::from_millis(5),
                    },
                },
            ],
        };

        let text = err.to_string();
        assert!(text.starts_with("2 of 3 branches failed in 'research'"));
        assert!(text.contains("[overview] Execution error in 'overview': boom"));
        assert!(text.contains("[examples]"));
        assert_eq!(err.failed_node(), Some("research"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlowError = io_err.into();
        assert!(matches!(err, FlowError::Io(_)));
        assert_eq!(err.failed_node(), None);
    }

    #[test]
    fn test_classification_helpers() {
        assert!(FlowError::Config("bad".to_string()).is_configuration());
        assert!(FlowError::Cancelled { node: "a".to_string() }.is_cancelled());
        assert!(!FlowError::Connector("x".to_string()).is_configuration());
    }
}
