//! In-memory block store.
//!
//! Never stores the same content twice: blocks are keyed by their hash and a
//! repeated put is a no-op.

use super::BlockService;
use crate::chunker::Block;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Hash -> bytes map behind a lock.
#[derive(Default)]
pub struct BlockStore {
    blocks: RwLock<HashMap<String, Bytes>>,
}

/// Counters for the store's current contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub count: u64,
    pub total_bytes: u64,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block after checking its hash. Returns false if the block's
    /// bytes do not hash to its claimed identity.
    pub fn put(&self, block: &Block) -> bool {
        if !block.verify() {
            tracing::warn!(hash = %block.hash, "Refusing block with mismatched hash");
            return false;
        }

        let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
        if !blocks.contains_key(&block.hash) {
            tracing::debug!(hash = %block.hash, size = block.size(), "Stored block");
            blocks.insert(block.hash.clone(), block.data.clone());
        }
        true
    }

    pub fn get(&self, hash: &str) -> Option<Block> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        blocks.get(hash).map(|data| Block {
            hash: hash.to_string(),
            data: data.clone(),
        })
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(hash)
    }

    /// Hashes from `hashes` that are stored, preserving input order.
    pub fn has(&self, hashes: &[String]) -> Vec<String> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        hashes
            .iter()
            .filter(|h| blocks.contains_key(h.as_str()))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        StoreStats {
            count: blocks.len() as u64,
            total_bytes: blocks.values().map(|b| b.len() as u64).sum(),
        }
    }
}

#[async_trait]
impl BlockService for BlockStore {
    async fn put_block(&self, block: &Block, _addr: &str) -> Result<bool> {
        Ok(self.put(block))
    }

    async fn get_block(&self, hash: &str, _addr: &str) -> Result<Block> {
        self.get(hash).ok_or_else(|| SyncError::MissingBlock {
            hash: hash.to_string(),
        })
    }

    async fn has_blocks(&self, hashes: &[String], _addr: &str) -> Result<Vec<String>> {
        Ok(self.has(hashes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve() {
        let store = BlockStore::new();
        let block = Block::new(Bytes::from_static(b"hello world chunk data"));

        assert!(!store.contains(&block.hash));
        assert!(store.get(&block.hash).is_none());

        assert!(store.put(&block));
        assert!(store.contains(&block.hash));
        assert_eq!(store.get(&block.hash).unwrap(), block);

        // Second put is accepted but stores nothing new
        assert!(store.put(&block));
        assert_eq!(store.stats().count, 1);
    }

    #[test]
    fn test_has_preserves_order() {
        let store = BlockStore::new();
        let b1 = Block::new(Bytes::from_static(b"chunk one"));
        let b2 = Block::new(Bytes::from_static(b"chunk two"));
        let b3 = Block::new(Bytes::from_static(b"chunk three"));

        store.put(&b3);
        store.put(&b1);

        let present = store.has(&[b1.hash.clone(), b2.hash.clone(), b3.hash.clone()]);
        assert_eq!(present, vec![b1.hash, b3.hash]);
    }

    #[test]
    fn test_rejects_mismatched_hash() {
        let store = BlockStore::new();
        let mut block = Block::new(Bytes::from_static(b"real data"));
        block.data = Bytes::from_static(b"tampered");

        assert!(!store.put(&block));
        assert_eq!(store.stats(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_missing_block_error() {
        let store = BlockStore::new();
        let err = store.get_block("deadbeef", "unused").await.unwrap_err();
        assert!(matches!(err, SyncError::MissingBlock { hash } if hash == "deadbeef"));
    }

    #[test]
    fn test_stats() {
        let store = BlockStore::new();
        store.put(&Block::new(Bytes::from_static(b"abcd")));
        store.put(&Block::new(Bytes::from_static(b"efg")));
        assert_eq!(
            store.stats(),
            StoreStats {
                count: 2,
                total_bytes: 7
            }
        );
    }
}
