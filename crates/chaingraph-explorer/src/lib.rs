//! Address and cluster graph exploration over a [`chaingraph_bus::MessageBus`].
//!
//! An [`Explorer`] owns one [`Session`]: the graph store, the set of loads in
//! progress and the collaborators the session talks to. Every user intent is a
//! [`Message`]; loading a node walks the stages in [`orchestrator`], with a bounded
//! neighbor prefetch in between.

mod degree;
pub mod error;
pub mod explorer;
mod handlers;
pub mod message;
pub mod orchestrator;
pub mod persist;
pub mod session;

pub use error::*;
pub use explorer::*;
pub use message::*;
pub use orchestrator::{mockup_cluster, MOCKUP_PREFIX};
pub use persist::*;
pub use session::*;
