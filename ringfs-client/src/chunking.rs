//! Splitting files into chunks and putting them back together.

use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

use ringfs_common::{ChunkIndex, CHUNK_COUNT};

/// Sizes of the chunks of a `len`-byte file.
///
/// Chunks differ by at most one byte; the first `len % 4` chunks carry the
/// extra byte.
pub fn chunk_sizes(len: u64) -> [u64; CHUNK_COUNT] {
    let count = CHUNK_COUNT as u64;
    let base = len / count;
    let extra = len % count;
    let mut sizes = [base; CHUNK_COUNT];
    for size in sizes.iter_mut().take(extra as usize) {
        *size += 1;
    }
    sizes
}

/// Cut `data` into its chunks without copying
pub fn split(data: Bytes) -> [Bytes; CHUNK_COUNT] {
    let sizes = chunk_sizes(data.len() as u64);
    let mut offset = 0;
    sizes.map(|size| {
        let end = offset + size as usize;
        let chunk = data.slice(offset..end);
        offset = end;
        chunk
    })
}

/// Concatenate the chunks present in `chunks` in ascending index order.
///
/// Missing indices are skipped, so the result is shorter than the original
/// file unless every chunk is present.
pub fn reassemble(chunks: &BTreeMap<ChunkIndex, Bytes>) -> Bytes {
    let total = chunks.values().map(Bytes::len).sum();
    let mut data = BytesMut::with_capacity(total);
    for chunk in chunks.values() {
        data.extend_from_slice(chunk);
    }
    data.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn index(value: u8) -> ChunkIndex {
        ChunkIndex::new(value).unwrap()
    }

    #[test]
    fn test_chunk_sizes() {
        assert_eq!(chunk_sizes(0), [0, 0, 0, 0]);
        assert_eq!(chunk_sizes(3), [1, 1, 1, 0]);
        assert_eq!(chunk_sizes(100), [25, 25, 25, 25]);
        assert_eq!(chunk_sizes(10), [3, 3, 2, 2]);
    }

    #[test]
    fn test_split_ten_bytes() {
        let parts = split(Bytes::from_static(b"0123456789"));
        assert_eq!(parts[0], Bytes::from_static(b"012"));
        assert_eq!(parts[1], Bytes::from_static(b"345"));
        assert_eq!(parts[2], Bytes::from_static(b"67"));
        assert_eq!(parts[3], Bytes::from_static(b"89"));
    }

    #[test]
    fn test_reassemble_skips_missing_chunks() {
        let mut chunks = BTreeMap::new();
        chunks.insert(index(4), Bytes::from_static(b"D"));
        chunks.insert(index(1), Bytes::from_static(b"A"));
        chunks.insert(index(2), Bytes::from_static(b"B"));

        assert_eq!(reassemble(&chunks), Bytes::from_static(b"ABD"));
    }

    proptest! {
        #[test]
        fn prop_split_then_reassemble(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let parts = split(Bytes::from(data.clone()));
            let chunks: BTreeMap<_, _> = ChunkIndex::all().zip(parts).collect();
            prop_assert_eq!(reassemble(&chunks).to_vec(), data);
        }

        #[test]
        fn prop_sizes_are_balanced(len in 0u64..1_000_000) {
            let sizes = chunk_sizes(len);
            prop_assert_eq!(sizes.iter().sum::<u64>(), len);
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            prop_assert!(max - min <= 1);
            prop_assert!(sizes.windows(2).all(|pair| pair[0] >= pair[1]));
        }
    }
}
