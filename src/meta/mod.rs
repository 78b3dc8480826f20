//! Metadata authority: the canonical filename -> (version, hash list) map.
//!
//! Clients never talk block bytes to the authority. They read a snapshot,
//! push blocks to the block store directly, then commit a new version here.
//! `update_file` is a compare-and-swap on the version number and is the only
//! concurrency control in the system.

pub mod store;

pub use store::MetaStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wire sentinel returned by `update_file` when the update is rejected
pub const CONFLICT_VERSION: i32 = -1;

/// One version of a file's content, described by its block hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    pub filename: String,
    pub version: i32,
    pub block_hash_list: Vec<String>,
}

impl FileMetaData {
    pub fn new(filename: impl Into<String>, version: i32, block_hash_list: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            version,
            block_hash_list,
        }
    }

    /// Same metadata with the version bumped by one and a new hash list.
    /// `None` once the version cannot go any higher.
    pub fn next_version(&self, block_hash_list: Vec<String>) -> Option<Self> {
        Some(Self {
            filename: self.filename.clone(),
            version: self.version.checked_add(1)?,
            block_hash_list,
        })
    }
}

/// Snapshot of the authority's map, ordered by filename.
pub type FileInfoMap = BTreeMap<String, FileMetaData>;

/// Result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Update stored; carries the new version.
    Accepted(i32),
    /// Proposed version was not exactly current + 1; nothing changed.
    Conflict,
}

impl UpdateOutcome {
    pub fn to_wire(self) -> i32 {
        match self {
            UpdateOutcome::Accepted(v) => v,
            UpdateOutcome::Conflict => CONFLICT_VERSION,
        }
    }

    pub fn from_wire(version: i32) -> Self {
        if version == CONFLICT_VERSION {
            UpdateOutcome::Conflict
        } else {
            UpdateOutcome::Accepted(version)
        }
    }
}

/// Client-side view of the metadata authority.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Full snapshot of the canonical map.
    async fn get_file_info_map(&self) -> Result<FileInfoMap>;

    /// Commit `meta` if its version is exactly one past the current one
    /// (or the file is new).
    async fn update_file(&self, meta: &FileMetaData) -> Result<UpdateOutcome>;

    /// Address of the block store clients should use.
    async fn get_block_store_addr(&self) -> Result<String>;
}

#[async_trait]
impl<T: MetadataService + ?Sized> MetadataService for Arc<T> {
    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        (**self).get_file_info_map().await
    }

    async fn update_file(&self, meta: &FileMetaData) -> Result<UpdateOutcome> {
        (**self).update_file(meta).await
    }

    async fn get_block_store_addr(&self) -> Result<String> {
        (**self).get_block_store_addr().await
    }
}
