//! Core types for RingFS
//!
//! A file is cut into a fixed number of ordered chunks; every chunk lives on
//! a storage node as a blob named `<file>.<index>`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RingError};

/// Number of chunks a file is split into
pub const CHUNK_COUNT: usize = 4;

/// Distinct chunk indices that must be reachable for a file to be complete
pub const CHUNK_QUORUM: usize = 3;

/// Chunks each node is responsible for
pub const CHUNKS_PER_NODE: usize = 2;

/// Live nodes required before a store is attempted
pub const MIN_LIVE_NODES: usize = 3;

/// 1-based position of a chunk within its file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkIndex(u8);

impl ChunkIndex {
    /// Returns `None` unless `value` is in `1..=CHUNK_COUNT`
    pub fn new(value: u8) -> Option<Self> {
        if value >= 1 && value as usize <= CHUNK_COUNT {
            Some(Self(value))
        } else {
            None
        }
    }

    /// All chunk indices in ascending order
    pub fn all() -> impl Iterator<Item = ChunkIndex> {
        (1..=CHUNK_COUNT as u8).map(ChunkIndex)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot, handy for indexing `[_; CHUNK_COUNT]` arrays
    pub fn slot(self) -> usize {
        self.0 as usize - 1
    }

    /// The following index on the ring, wrapping the last chunk to the first
    pub fn next(self) -> Self {
        Self(self.0 % CHUNK_COUNT as u8 + 1)
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A storage node as listed in the static node configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl NodeInfo {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

/// Name of the blob holding chunk `index` of `file`
pub fn blob_name(file: &str, index: ChunkIndex) -> String {
    format!("{}.{}", file, index)
}

/// Split a blob name into its file name and chunk index.
///
/// Only an exact `.1` to `.4` suffix on a non-empty base is accepted.
pub fn parse_blob_name(name: &str) -> Option<(&str, ChunkIndex)> {
    let (base, suffix) = name.rsplit_once('.')?;
    if base.is_empty() || suffix.len() != 1 {
        return None;
    }
    let digit = suffix.as_bytes()[0];
    if !digit.is_ascii_digit() {
        return None;
    }
    ChunkIndex::new(digit - b'0').map(|index| (base, index))
}

/// Check that `name` is a bare file name usable as a blob prefix
pub fn validate_file_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.starts_with('.') {
        Some("names starting with '.' are reserved")
    } else if name.contains(&['/', '\\'][..]) {
        Some("name contains a path separator")
    } else if name.contains(&['\0', '\n', '\r'][..]) {
        Some("name contains a control character")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RingError::InvalidFileName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
