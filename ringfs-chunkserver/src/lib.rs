//! RingFS chunk server: holds chunk blobs in a flat directory and serves
//! ENUMERATE, STORE and FETCH, one request per connection.

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod storage;

pub use config::ChunkServerConfig;
pub use error::{ChunkServerError, Result};
pub use handler::handle_connection;
pub use server::ChunkServer;
pub use storage::{BlobReader, BlobStore, BlobWriter, FileBlobStore};
