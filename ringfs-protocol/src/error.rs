use thiserror::Error;

/// Errors raised while framing or parsing node protocol traffic
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed header {line:?}: {reason}")]
    Malformed { line: String, reason: String },

    #[error("Header line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("Header line is not valid UTF-8")]
    InvalidUtf8,

    #[error("Stream ended in the middle of a header line")]
    UnterminatedLine,

    #[error("Stream ended with {missing} payload bytes outstanding")]
    Truncated { missing: u64 },

    #[error("Unexpected {got} while waiting for {expected}")]
    Unexpected { expected: &'static str, got: String },
}

impl ProtocolError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the peer hung up or the transport failed, as opposed to a
    /// well-delivered but invalid message
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_) | ProtocolError::UnterminatedLine | ProtocolError::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
