use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record `{0}` not found")]
    NotFound(String),
    #[error("body `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid record: {0}")]
    Validation(String),
    #[error("import failed: {0}")]
    ImportFormat(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
