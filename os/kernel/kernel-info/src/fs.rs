//! # Block Cache Geometry

/// Size of one disk block, and of every buffer's payload, in bytes.
pub const BLOCK_SIZE: usize = 1024;

/// Number of buffers in the block cache.
pub const NBUF: usize = 30;

/// Number of hash buckets the block cache stripes its lookup table over.
///
/// A prime count spreads sequential block numbers evenly.
pub const NBUCKETS: usize = 13;

const _: () = {
    assert!(BLOCK_SIZE.is_power_of_two());
    assert!(NBUCKETS > 0);
    assert!(NBUF >= NBUCKETS);
};
