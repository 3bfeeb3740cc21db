use chaingraph_core::ChainGraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Cluster membership broken: {0}")]
    Membership(String),

    #[error(transparent)]
    Core(#[from] ChainGraphError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::MalformedSnapshot(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
