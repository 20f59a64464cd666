use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReasonGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Merge would create a cycle: {0}")]
    CycleRejected(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector error: {0}")]
    Vector(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("External service error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, ReasonGraphError>;
