pub mod compression;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod payload;
pub mod status;
pub mod traits;
pub mod types;

pub use compression::*;
pub use config::*;
pub use entity::*;
pub use error::*;
pub use logging::*;
pub use payload::*;
pub use status::*;
pub use traits::*;
pub use types::*;
