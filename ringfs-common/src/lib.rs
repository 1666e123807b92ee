//! Shared building blocks for RingFS: node identities, chunk naming,
//! the node list and the deterministic placement ring.

pub mod config;
pub mod error;
pub mod placement;
pub mod types;

pub use config::NodeList;
pub use error::{Result, RingError};
pub use placement::{ChunkPair, Placement};
pub use types::*;
