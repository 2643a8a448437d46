use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Type(#[from] cairn_types::TypeError),

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),

    #[error("tree error: {0}")]
    Tree(cairn_tree::TreeError),

    #[error("directory error: {0}")]
    Dir(cairn_dir::DirError),

    #[error("gc error: {0}")]
    Gc(#[from] cairn_gc::GcError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cairn_tree::TreeError> for SdkError {
    fn from(err: cairn_tree::TreeError) -> Self {
        match err {
            cairn_tree::TreeError::Cancelled => SdkError::Cancelled,
            other => SdkError::Tree(other),
        }
    }
}

impl From<cairn_dir::DirError> for SdkError {
    fn from(err: cairn_dir::DirError) -> Self {
        match err {
            cairn_dir::DirError::Cancelled => SdkError::Cancelled,
            other => SdkError::Dir(other),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
