use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcError {
    #[error("invalid gc configuration: {0}")]
    InvalidConfig(String),

    #[error("collection cancelled while marking roots")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),

    #[error("tree error: {0}")]
    Tree(#[from] cairn_tree::TreeError),
}

pub type GcResult<T> = Result<T, GcError>;
