use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {0}, got {1}")]
    DimensionMismatch(usize, usize),

    #[error("Batch size mismatch: sent {0} texts, received {1} embeddings")]
    BatchSizeMismatch(usize, usize),

    #[error("Vector is empty")]
    EmptyVector,

    #[error("Vector not indexed: {0}")]
    NotIndexed(String),

    #[error("Cost matrix contains a non-finite value at ({0}, {1})")]
    NonFiniteCost(usize, usize),

    #[error("Invalid vector operation: {0}")]
    InvalidOperation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Search error: {0}")]
    Search(String),
}

impl From<VectorError> for reasongraph_core::ReasonGraphError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::Embedding(msg) => reasongraph_core::ReasonGraphError::Embedding(msg),
            VectorError::BatchSizeMismatch(..) => {
                reasongraph_core::ReasonGraphError::Embedding(err.to_string())
            }
            other => reasongraph_core::ReasonGraphError::Vector(other.to_string()),
        }
    }
}
