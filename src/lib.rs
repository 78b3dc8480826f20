//! surfsync: block-level directory sync against a central metadata authority.
//!
//! - [`chunker`] splits files into fixed-size, hash-identified blocks
//! - [`blocks`] stores blocks by hash
//! - [`meta`] holds the canonical filename -> (version, hashes) map and
//!   arbitrates concurrent commits by version number
//! - [`index`] persists a client's last-synced view
//! - [`sync`] runs a reconciliation pass
//! - [`rpc`] and [`server`] put the two services on the network

pub mod blocks;
pub mod chunker;
pub mod config;
pub mod error;
pub mod index;
pub mod meta;
pub mod rpc;
pub mod server;
pub mod sync;

pub use blocks::{BlockService, BlockStore};
pub use chunker::{block_hash, compute_blocks, Block};
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use index::LocalIndex;
pub use meta::{FileInfoMap, FileMetaData, MetaStore, MetadataService, UpdateOutcome};
pub use rpc::RpcClient;
pub use sync::{SyncEngine, SyncReport};
