//! Message bus driving a single-threaded session.
//!
//! Every message name is declared up front in a [`Vocabulary`] with its delivery
//! mode and whether it modifies the graph. Handlers run one at a time on the task
//! that drives [`MessageBus::run_until_idle`]; remote fetches run as tokio tasks
//! and report back through the deferred queue.

pub mod bus;
pub mod error;
pub mod history;
pub mod publisher;
pub mod vocabulary;

pub use bus::*;
pub use error::*;
pub use history::*;
pub use publisher::*;
pub use vocabulary::*;

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A message of a closed vocabulary. `name` must be one of the declared names.
pub trait BusMessage: Clone + Debug + Send + Serialize + DeserializeOwned + 'static {
    fn name(&self) -> &'static str;
}
