//! Fixed-size chunking and content hashing.
//!
//! A file is a sequence of blocks of `block_size` bytes; only the last block
//! may be shorter. Each block is identified by the hex BLAKE3 hash of its
//! bytes, which is both its key in the block store and the unit of change
//! detection.

use bytes::Bytes;
use std::fmt;

/// Length of a hex-encoded block hash
pub const HASH_HEX_LEN: usize = 64;

/// Default block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// An immutable chunk of file content, identified by its hash.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub data: Bytes,
}

impl Block {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            hash: block_hash(&data),
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// True if `hash` really is the hash of `data`.
    pub fn verify(&self) -> bool {
        block_hash(&self.data) == self.hash
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block({}, {} bytes)",
            self.hash.get(..16).unwrap_or(&self.hash),
            self.data.len()
        )
    }
}

/// Hex-encoded BLAKE3 hash of a block's bytes.
pub fn block_hash(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

/// Whether `s` has the shape of a block hash (lowercase hex, full length).
pub fn is_block_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Split `data` into blocks of `block_size` bytes. The last block carries
/// the remainder and is never padded; empty input yields no blocks.
///
/// # Panics
/// Panics if `block_size` is zero.
pub fn compute_blocks(data: &[u8], block_size: usize) -> Vec<Block> {
    assert!(block_size > 0, "block size must be non-zero");
    let data = Bytes::copy_from_slice(data);
    (0..data.len())
        .step_by(block_size)
        .map(|start| {
            let end = (start + block_size).min(data.len());
            Block::new(data.slice(start..end))
        })
        .collect()
}

/// Ordered hash list for `data`, without keeping the block bytes.
///
/// # Panics
/// Panics if `block_size` is zero.
pub fn hash_list(data: &[u8], block_size: usize) -> Vec<String> {
    assert!(block_size > 0, "block size must be non-zero");
    data.chunks(block_size).map(block_hash).collect()
}
