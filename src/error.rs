use crate::engine::EngineError;

/// Error type returned at the node boundary. None of these are fatal, the node stays usable
#[derive(Debug, Clone, PartialEq)]
pub enum NodeError {
    /// `start`/`stop` was called before the host finished attaching the node
    NotAttached,
    /// The host could not create the processing unit backing the node
    InstantiationFailed(String),
    /// A parameter write was outside the range the parameter accepts
    InvalidParameterRange {
        parameter: &'static str,
        value: f32
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::NotAttached => write!(f, "Node is not attached to an engine yet"),
            NodeError::InstantiationFailed(msg) => write!(f, "Failed to instantiate processing unit: {}", msg),
            NodeError::InvalidParameterRange { parameter, value } => {
                write!(f, "Value {} is out of range for parameter {}", value, parameter)
            }
        }
    }
}

impl std::error::Error for NodeError {}

impl From<EngineError> for NodeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownUnit | EngineError::NotAttached => NodeError::NotAttached,
            other => NodeError::InstantiationFailed(other.to_string())
        }
    }
}

pub type NodeResult<T> = Result<T, NodeError>;
