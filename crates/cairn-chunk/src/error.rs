/// Errors from chunker configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunking options: {0}")]
    InvalidOptions(String),
}

pub type ChunkResult<T> = Result<T, ChunkError>;
