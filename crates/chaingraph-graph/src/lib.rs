pub mod edge;
pub mod error;
pub mod snapshot;
pub mod store;

pub use edge::*;
pub use error::*;
pub use snapshot::*;
pub use store::*;
