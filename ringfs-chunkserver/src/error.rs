use thiserror::Error;

use ringfs_protocol::{ProtocolError, Response};

/// ChunkServer specific errors
#[derive(Error, Debug)]
pub enum ChunkServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Blob not found: {name}")]
    BlobNotFound { name: String },

    #[error("Invalid blob name {name:?}: {reason}")]
    InvalidBlobName { name: String, reason: String },

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Connection closed before {0}")]
    ConnectionClosed(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChunkServerError {
    /// Response sent to the peer when a request fails before its body starts
    pub fn to_response(&self) -> Response {
        match self {
            ChunkServerError::BlobNotFound { .. } => Response::NotFound,
            other => Response::Error(other.to_string()),
        }
    }
}

/// Result type for ChunkServer operations
pub type Result<T> = std::result::Result<T, ChunkServerError>;
