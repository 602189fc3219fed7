use thiserror::Error;

/// Failures talking to the embedding API or the vector store
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("qdrant error: {0}")]
    Qdrant(String),

    /// Transport failure: connection refused, timeout, undecodable body
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
