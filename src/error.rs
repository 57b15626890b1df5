use std::fmt;

#[derive(Debug, Clone)]
pub enum ScribeError {
    ConfigurationError(String),
    TaskError(String),
    TransportError(String),
    ResourceError(String),
    PipelineError(String),
}

impl fmt::Display for ScribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScribeError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            ScribeError::TaskError(msg) => write!(f, "Task error: {msg}"),
            ScribeError::TransportError(msg) => write!(f, "Transport error: {msg}"),
            ScribeError::ResourceError(msg) => write!(f, "Resource error: {msg}"),
            ScribeError::PipelineError(msg) => write!(f, "Pipeline error: {msg}"),
        }
    }
}

impl std::error::Error for ScribeError {}

impl From<crate::tasks::TaskManagerError> for ScribeError {
    fn from(err: crate::tasks::TaskManagerError) -> Self {
        ScribeError::TaskError(err.to_string())
    }
}

impl From<crate::transport::HttpPoolError> for ScribeError {
    fn from(err: crate::transport::HttpPoolError) -> Self {
        ScribeError::TransportError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;
