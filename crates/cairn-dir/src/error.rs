use cairn_tree::TreeError;
use cairn_types::ContentHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirError {
    /// The operation would make one name denote both a file and a directory
    /// in the same parent. The tree is left unchanged.
    #[error("name collision at {0}")]
    NameCollision(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("file length {given} does not match content length {actual} for {path}")]
    LengthMismatch { path: String, given: u64, actual: u64 },

    /// A collapsed directory was reached but the tree has no reader to
    /// expand it.
    #[error("cannot expand collapsed directory {0} without a reader")]
    Detached(String),

    #[error("malformed directory node {hash}: {reason}")]
    MalformedDirectory { hash: ContentHash, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("tree error: {0}")]
    Tree(TreeError),

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DirResult<T> = Result<T, DirError>;

impl From<TreeError> for DirError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::Cancelled => DirError::Cancelled,
            other => DirError::Tree(other),
        }
    }
}
