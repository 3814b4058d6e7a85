pub mod error;
pub mod types;

pub use error::LodestoneError;
pub use types::{BlockPosition, ProtocolState, ProtocolVersion, Result};
