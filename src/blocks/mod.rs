//! Content-addressed block storage.
//!
//! The block store only knows hashes and bytes. Which blocks make up which
//! file is the metadata authority's business.

pub mod store;

pub use store::BlockStore;

use crate::chunker::Block;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Client-side view of a block store reachable at `addr`.
#[async_trait]
pub trait BlockService: Send + Sync {
    /// Store a block. Returns whether the store accepted it.
    async fn put_block(&self, block: &Block, addr: &str) -> Result<bool>;

    /// Fetch a block by hash. Fails with `MissingBlock` if absent.
    async fn get_block(&self, hash: &str, addr: &str) -> Result<Block>;

    /// The subset of `hashes` already stored, in input order.
    async fn has_blocks(&self, hashes: &[String], addr: &str) -> Result<Vec<String>>;
}

#[async_trait]
impl<T: BlockService + ?Sized> BlockService for Arc<T> {
    async fn put_block(&self, block: &Block, addr: &str) -> Result<bool> {
        (**self).put_block(block, addr).await
    }

    async fn get_block(&self, hash: &str, addr: &str) -> Result<Block> {
        (**self).get_block(hash, addr).await
    }

    async fn has_blocks(&self, hashes: &[String], addr: &str) -> Result<Vec<String>> {
        (**self).has_blocks(hashes, addr).await
    }
}
