//! Reconciliation pass.
//!
//! One pass runs scan -> candidate rebuild -> remote snapshot -> classify ->
//! download phase -> upload phase -> persist:
//!
//! ```text
//! disk bytes ──hash──> local candidate ─┐
//! index.txt (last pass) ────────────────┤ classify ──> download / upload / keep
//! authority snapshot ───────────────────┘
//! ```
//!
//! Files are reconciled independently. A failure on one file is logged and
//! recorded in the `SyncReport`; its previous index entry is kept so the next
//! pass derives the same diff again. Only a failed directory scan, a corrupt
//! index, or an unreachable authority abort the whole pass.

pub mod plan;
pub mod scanner;

pub use plan::{classify, local_candidate, Action};
pub use scanner::{scan_dir, ScanResult, TEMP_SUFFIX};

use crate::blocks::BlockService;
use crate::chunker::{self, Block};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::index::{is_indexable, LocalIndex};
use crate::meta::{FileInfoMap, FileMetaData, MetadataService, UpdateOutcome};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A file whose reconciliation was abandoned for this pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    /// Local changes committed to the authority
    pub uploaded: Vec<String>,
    /// Remote changes written to disk
    pub downloaded: Vec<String>,
    /// Already in agreement
    pub unchanged: Vec<String>,
    /// Local changes discarded in favour of another client's commit
    pub conflicted: Vec<String>,
    /// Abandoned this pass, retried next pass
    pub failed: Vec<FileFailure>,
    /// Names the index cannot represent
    pub skipped: Vec<String>,

    pub blocks_uploaded: u64,
    pub blocks_deduplicated: u64,
    pub blocks_downloaded: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub duration_ms: u64,
}

impl SyncReport {
    /// True when no file failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn has_failed(&self, filename: &str) -> bool {
        self.failed.iter().any(|f| f.filename == filename)
    }

    fn record_failure(&mut self, filename: &str, err: &SyncError) {
        tracing::warn!(filename, error = %err, "File not reconciled this pass");
        self.failed.push(FileFailure {
            filename: filename.to_string(),
            error: err.to_string(),
        });
    }
}

/// Result of pushing a local candidate
enum Commit {
    Accepted,
    /// Another client won; carries the authority's entry we adopted.
    Lost(FileMetaData),
}

/// Drives reconciliation passes for one directory.
pub struct SyncEngine<M, B> {
    base_dir: PathBuf,
    block_size: usize,
    meta: M,
    blocks: B,
}

impl<M: MetadataService, B: BlockService> SyncEngine<M, B> {
    pub fn new(config: &SyncConfig, meta: M, blocks: B) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            block_size: config.block_size,
            meta,
            blocks,
        }
    }

    /// Run one full pass and persist the resolved index.
    pub async fn run_pass(&self) -> Result<SyncReport> {
        let started = Instant::now();

        let scan = scanner::scan_dir(&self.base_dir)?;
        let mut index = LocalIndex::load(&self.base_dir)?;
        let mut report = SyncReport {
            skipped: scan.skipped,
            ..SyncReport::default()
        };

        tracing::info!(
            dir = %self.base_dir.display(),
            files = scan.files.len(),
            indexed = index.len(),
            "Starting sync pass"
        );

        let mut candidates = FileInfoMap::new();
        for name in &scan.files {
            match self.read_hash_list(name).await {
                Ok(hashes) => match plan::local_candidate(name, hashes, index.get(name)) {
                    Some(candidate) => {
                        candidates.insert(name.clone(), candidate);
                    }
                    None => report.record_failure(
                        name,
                        &SyncError::VersionExhausted {
                            filename: name.clone(),
                        },
                    ),
                },
                Err(e) => report.record_failure(name, &e),
            }
        }

        let remote = self.meta.get_file_info_map().await?;
        let addr = self.meta.get_block_store_addr().await?;
        tracing::debug!(remote_files = remote.len(), block_store = %addr, "Fetched remote snapshot");

        let mut resolved = FileInfoMap::new();
        let mut downloads = Vec::new();
        let mut uploads = Vec::new();

        let names: BTreeSet<&String> = candidates.keys().chain(remote.keys()).collect();
        for name in names {
            if report.has_failed(name) {
                continue;
            }

            let candidate = candidates.get(name);
            let remote_meta = remote.get(name);

            // A remote entry must name a file directly under the root and
            // survive a round trip through the index
            if let Some(theirs) = remote_meta {
                if !scanner::is_syncable_name(name) || theirs.filename != *name {
                    tracing::warn!(filename = ?name, "Ignoring remote entry with unusable name");
                    report.skipped.push(name.clone());
                    continue;
                }
                if !is_indexable(theirs) {
                    report.record_failure(
                        name,
                        &SyncError::InvalidRemoteEntry {
                            filename: name.clone(),
                        },
                    );
                    continue;
                }
            }

            match (plan::classify(candidate, remote_meta), candidate, remote_meta) {
                (Action::Unchanged, Some(local), _) => {
                    report.unchanged.push(name.clone());
                    resolved.insert(name.clone(), local.clone());
                }
                (Action::Upload, Some(local), _) => uploads.push(local.clone()),
                (Action::Download, _, Some(theirs)) => downloads.push((theirs.clone(), false)),
                (Action::Stale, _, Some(theirs)) => downloads.push((theirs.clone(), true)),
                _ => {}
            }
        }

        report.skipped.sort();
        report.skipped.dedup();

        for (theirs, stale) in downloads {
            let name = theirs.filename.clone();
            match self
                .materialize(&addr, &theirs, candidates.get(&name), &mut report)
                .await
            {
                Ok(()) => {
                    if stale {
                        tracing::info!(filename = %name, version = theirs.version, "Local edit lost to an earlier commit");
                        report.conflicted.push(name.clone());
                    } else {
                        report.downloaded.push(name.clone());
                    }
                    resolved.insert(name, theirs);
                }
                Err(e) => report.record_failure(&name, &e),
            }
        }

        for candidate in uploads {
            let name = candidate.filename.clone();
            match self.upload(&addr, &candidate, &mut report).await {
                Ok(Commit::Accepted) => {
                    report.uploaded.push(name.clone());
                    resolved.insert(name, candidate);
                }
                Ok(Commit::Lost(winner)) => {
                    report.conflicted.push(name.clone());
                    resolved.insert(name, winner);
                }
                Err(e) => report.record_failure(&name, &e),
            }
        }

        // Failed files keep last pass's entry so the next pass sees the same diff
        for failure in &report.failed {
            if let Some(previous) = index.get(&failure.filename) {
                resolved.insert(failure.filename.clone(), previous.clone());
            }
        }

        index.replace_all(resolved);
        index.save()?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            uploaded = report.uploaded.len(),
            downloaded = report.downloaded.len(),
            unchanged = report.unchanged.len(),
            conflicted = report.conflicted.len(),
            failed = report.failed.len(),
            duration_ms = report.duration_ms,
            "Sync pass complete"
        );

        Ok(report)
    }

    async fn read_hash_list(&self, filename: &str) -> Result<Vec<String>> {
        let data = tokio::fs::read(self.base_dir.join(filename)).await?;
        Ok(chunker::hash_list(&data, self.block_size))
    }

    /// Push missing blocks, then try to commit `candidate`.
    async fn upload(
        &self,
        addr: &str,
        candidate: &FileMetaData,
        report: &mut SyncReport,
    ) -> Result<Commit> {
        let data = tokio::fs::read(self.base_dir.join(&candidate.filename)).await?;
        let blocks = chunker::compute_blocks(&data, self.block_size);

        if !blocks
            .iter()
            .map(|b| &b.hash)
            .eq(candidate.block_hash_list.iter())
        {
            return Err(SyncError::FileChanged {
                filename: candidate.filename.clone(),
            });
        }

        let mut seen = HashSet::new();
        let unique: Vec<&Block> = blocks
            .iter()
            .filter(|b| seen.insert(b.hash.as_str()))
            .collect();
        let hashes: Vec<String> = unique.iter().map(|b| b.hash.clone()).collect();
        let present: HashSet<String> = self
            .blocks
            .has_blocks(&hashes, addr)
            .await?
            .into_iter()
            .collect();

        for block in unique {
            if present.contains(&block.hash) {
                report.blocks_deduplicated += 1;
                continue;
            }
            if !self.blocks.put_block(block, addr).await? {
                return Err(SyncError::BlockRejected {
                    hash: block.hash.clone(),
                });
            }
            report.blocks_uploaded += 1;
            report.bytes_uploaded += block.size() as u64;
        }

        match self.meta.update_file(candidate).await? {
            UpdateOutcome::Accepted(version) => {
                tracing::info!(filename = %candidate.filename, version, "Uploaded");
                Ok(Commit::Accepted)
            }
            UpdateOutcome::Conflict => {
                tracing::info!(
                    filename = %candidate.filename,
                    proposed = candidate.version,
                    "Version conflict, adopting the authority's copy"
                );
                let remote = self.meta.get_file_info_map().await?;
                let winner = remote.get(&candidate.filename).cloned().ok_or_else(|| {
                    SyncError::RemoteVanished {
                        filename: candidate.filename.clone(),
                    }
                })?;
                if !is_indexable(&winner) {
                    return Err(SyncError::InvalidRemoteEntry {
                        filename: candidate.filename.clone(),
                    });
                }
                self.materialize(addr, &winner, Some(candidate), report)
                    .await?;
                Ok(Commit::Lost(winner))
            }
        }
    }

    /// Make the file on disk match `target`, fetching its blocks in order.
    async fn materialize(
        &self,
        addr: &str,
        target: &FileMetaData,
        on_disk: Option<&FileMetaData>,
        report: &mut SyncReport,
    ) -> Result<()> {
        if on_disk.is_some_and(|local| local.block_hash_list == target.block_hash_list) {
            tracing::debug!(filename = %target.filename, "Content already on disk");
            return Ok(());
        }

        let mut data = Vec::new();
        for hash in &target.block_hash_list {
            let block = self.blocks.get_block(hash, addr).await?;
            if block.hash != *hash || !block.verify() {
                return Err(SyncError::CorruptBlock { hash: hash.clone() });
            }
            data.extend_from_slice(&block.data);
            report.blocks_downloaded += 1;
        }

        let size = data.len() as u64;
        write_atomic(&self.base_dir, &target.filename, data).await?;
        report.bytes_downloaded += size;
        tracing::info!(filename = %target.filename, version = target.version, bytes = size, "Downloaded");

        Ok(())
    }
}

/// Write `data` to `dir/filename` via a temp file in the same directory and
/// a rename, so a crash never leaves a half-written file under the real name.
async fn write_atomic(dir: &Path, filename: &str, data: Vec<u8>) -> Result<()> {
    let dir = dir.to_path_buf();
    let target = dir.join(filename);

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| SyncError::Io(io::Error::other(e)))?
}
