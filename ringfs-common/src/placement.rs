//! Deterministic chunk placement
//!
//! Every node holds two consecutive chunks of a file. The ring of pairs is
//! rotated by a digest of the file name, so any party that knows the file
//! name and the node count can work out the layout without asking anyone.

use tracing::trace;

use crate::error::{Result, RingError};
use crate::types::{ChunkIndex, CHUNKS_PER_NODE, CHUNK_COUNT};

/// Chunk pair a single node is responsible for
pub type ChunkPair = [ChunkIndex; CHUNKS_PER_NODE];

/// Placement of one file's chunks over an ordered list of nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    rotation: usize,
    assignment: Vec<ChunkPair>,
}

impl Placement {
    /// Compute the placement of `file_name` over `node_count` nodes
    pub fn compute(file_name: &str, node_count: usize) -> Result<Self> {
        if node_count == 0 {
            return Err(RingError::InvalidConfiguration(
                "placement requires at least one node".to_string(),
            ));
        }

        let rotation = (name_digest(file_name) % node_count as u64) as usize;
        let assignment = (0..node_count)
            .map(|node| chunk_pair(rotation, node))
            .collect();

        trace!(
            "Placement for {:?} over {} nodes: rotation {}",
            file_name,
            node_count,
            rotation
        );

        Ok(Self { rotation, assignment })
    }

    pub fn rotation(&self) -> usize {
        self.rotation
    }

    pub fn node_count(&self) -> usize {
        self.assignment.len()
    }

    /// Chunks expected on the node at `node`, or `None` past the end of the list
    pub fn chunks_for(&self, node: usize) -> Option<ChunkPair> {
        self.assignment.get(node).copied()
    }

    /// Node indices expected to hold `chunk`, in ascending order
    pub fn holders(&self, chunk: ChunkIndex) -> impl Iterator<Item = usize> + '_ {
        self.assignment
            .iter()
            .enumerate()
            .filter(move |(_, pair)| pair.contains(&chunk))
            .map(|(node, _)| node)
    }

    pub fn assignment(&self) -> &[ChunkPair] {
        &self.assignment
    }

    /// Whether every chunk index has at least one holder
    pub fn covers_all_chunks(&self) -> bool {
        ChunkIndex::all().all(|chunk| self.holders(chunk).next().is_some())
    }
}

/// First four bytes of the MD5 digest of the name, big-endian
pub fn name_digest(file_name: &str) -> u64 {
    let digest = md5::compute(file_name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as u64
}

/// Pair held by `node` when the ring is rotated by `rotation`.
///
/// Rotation 0 gives node 0 chunks (1,2), node 1 (2,3), node 2 (3,4) and
/// node 3 (4,1); each extra step of rotation shifts the ring one node to
/// the right. Nodes past the fourth repeat the cycle.
fn chunk_pair(rotation: usize, node: usize) -> ChunkPair {
    let ring = CHUNK_COUNT as i64;
    let offset = (node as i64 - rotation as i64).rem_euclid(ring);
    let first = index_from_offset(offset as usize);
    [first, first.next()]
}

fn index_from_offset(offset: usize) -> ChunkIndex {
    ChunkIndex::all()
        .nth(offset % CHUNK_COUNT)
        .unwrap_or_else(|| unreachable!("offset is reduced modulo the chunk count"))
}
