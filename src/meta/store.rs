//! In-memory metadata authority.

use super::{FileInfoMap, FileMetaData, MetadataService, UpdateOutcome};
use crate::error::Result;
use crate::sync::scanner::is_syncable_name;
use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

/// Canonical filename map guarded by a single lock.
///
/// Snapshots clone the map under the read lock; `update_file` runs its
/// read-check-write under the write lock, so a reader never sees a
/// half-replaced entry and two writers can never both win the same version.
pub struct MetaStore {
    files: RwLock<FileInfoMap>,
    block_store_addr: String,
}

impl MetaStore {
    pub fn new(block_store_addr: impl Into<String>) -> Self {
        Self {
            files: RwLock::new(FileInfoMap::new()),
            block_store_addr: block_store_addr.into(),
        }
    }

    pub fn file_info_map(&self) -> FileInfoMap {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn block_store_addr(&self) -> &str {
        &self.block_store_addr
    }

    pub fn update(&self, candidate: &FileMetaData) -> UpdateOutcome {
        if candidate.version < 1 || !is_syncable_name(&candidate.filename) {
            tracing::warn!(
                filename = ?candidate.filename,
                proposed = candidate.version,
                "Rejected malformed update"
            );
            return UpdateOutcome::Conflict;
        }

        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(current) = files.get(&candidate.filename) {
            if current.version.checked_add(1) != Some(candidate.version) {
                tracing::debug!(
                    filename = %candidate.filename,
                    current = current.version,
                    proposed = candidate.version,
                    "Rejected update"
                );
                return UpdateOutcome::Conflict;
            }
        }

        files.insert(candidate.filename.clone(), candidate.clone());
        tracing::info!(
            filename = %candidate.filename,
            version = candidate.version,
            blocks = candidate.block_hash_list.len(),
            "Accepted update"
        );
        UpdateOutcome::Accepted(candidate.version)
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataService for MetaStore {
    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        Ok(self.file_info_map())
    }

    async fn update_file(&self, meta: &FileMetaData) -> Result<UpdateOutcome> {
        Ok(self.update(meta))
    }

    async fn get_block_store_addr(&self) -> Result<String> {
        Ok(self.block_store_addr.clone())
    }
}
