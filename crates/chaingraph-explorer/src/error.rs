use chaingraph_bus::BusError;
use chaingraph_core::ChainGraphError;
use chaingraph_graph::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// The UI and the store disagree, e.g. selecting a node that was never loaded.
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Core error: {0}")]
    Core(#[from] ChainGraphError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(String),
}

impl From<serde_json::Error> for ExplorerError {
    fn from(err: serde_json::Error) -> Self {
        ExplorerError::Snapshot(err.to_string())
    }
}

impl ExplorerError {
    /// Unwraps an error a handler returned from inside the bus.
    pub(crate) fn lift(err: BusError) -> Self {
        match err {
            BusError::Handler { name, source } => match source.downcast::<ExplorerError>() {
                Ok(inner) => *inner,
                Err(source) => ExplorerError::Bus(BusError::Handler { name, source }),
            },
            other => ExplorerError::Bus(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
