use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),
}

pub type Result<T> = std::result::Result<T, ChainGraphError>;
