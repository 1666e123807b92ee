use thiserror::Error;

/// Errors shared by every RingFS component
#[derive(Error, Debug)]
pub enum RingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid file name {name:?}: {reason}")]
    InvalidFileName { name: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, RingError>;
