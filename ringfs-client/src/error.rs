use std::path::PathBuf;
use thiserror::Error;

use ringfs_common::RingError;
use ringfs_protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Node {node} unreachable: {reason}")]
    NodeUnreachable { node: String, reason: String },

    #[error("Protocol error talking to {node}: {source}")]
    Protocol {
        node: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Node {node} rejected the request: {message}")]
    Rejected { node: String, message: String },

    #[error(
        "Insufficient redundancy for {file}: {available} {what} available, {required} required"
    )]
    InsufficientRedundancy {
        file: String,
        what: &'static str,
        available: usize,
        required: usize,
    },

    #[error("Local I/O error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ClientError::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only concerns a single node and the operation can
    /// carry on with the others
    pub fn is_node_local(&self) -> bool {
        matches!(
            self,
            ClientError::NodeUnreachable { .. }
                | ClientError::Protocol { .. }
                | ClientError::Rejected { .. }
        )
    }
}

impl From<RingError> for ClientError {
    fn from(err: RingError) -> Self {
        match err {
            RingError::Configuration(msg) | RingError::InvalidConfiguration(msg) => {
                ClientError::Configuration(msg)
            }
            err @ RingError::InvalidFileName { .. } => {
                ClientError::InvalidArgument(err.to_string())
            }
            RingError::Io(source) => ClientError::LocalIo {
                path: PathBuf::new(),
                source,
            },
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
