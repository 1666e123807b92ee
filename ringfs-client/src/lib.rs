//! RingFS client library
//!
//! Splits files into chunks, spreads them over the storage nodes according
//! to the placement ring, and gets them back.

pub mod chunking;
pub mod config;
pub mod error;
pub mod node_client;
pub mod orchestrator;
pub mod prober;

pub use crate::chunking::{chunk_sizes, reassemble, split};
pub use crate::config::ClientConfig;
pub use crate::error::{ClientError, ClientResult};
pub use crate::node_client::NodeClient;
pub use crate::orchestrator::{
    ChunkTransfer, FetchReport, FileStatus, Listing, Orchestrator, StoreReport, TransferFailure,
};
pub use crate::prober::{ClusterView, Prober};
