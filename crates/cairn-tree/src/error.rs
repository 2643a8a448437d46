use cairn_types::ContentHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    /// Stored bytes do not decode as a node, or do not hash to their key.
    #[error("malformed node {hash}: {reason}")]
    MalformedNode { hash: ContentHash, reason: String },

    /// A handle points at a node the store does not have.
    #[error("missing referenced node: {0}")]
    MissingReference(ContentHash),

    /// A node of the wrong kind was found where the traversal expected another.
    #[error("unexpected {found} node {hash}, expected {expected}")]
    UnexpectedKind {
        hash: ContentHash,
        found: &'static str,
        expected: &'static str,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),

    #[error("chunking error: {0}")]
    Chunk(#[from] cairn_chunk::ChunkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TreeError {
    pub(crate) fn malformed(hash: ContentHash, reason: impl Into<String>) -> Self {
        Self::MalformedNode {
            hash,
            reason: reason.into(),
        }
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
