use thiserror::Error;

/// Error returned by a message handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Undeclared message: {0}")]
    UndeclaredMessage(String),

    #[error("Invalid control message {name}: {reason}")]
    InvalidControlMessage { name: String, reason: String },

    #[error("Handler for {name} failed: {source}")]
    Handler {
        name: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("History error: {0}")]
    History(#[from] serde_json::Error),
}

impl BusError {
    /// Recovers the concrete error a handler returned.
    pub fn handler_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            BusError::Handler { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
