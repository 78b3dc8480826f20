//! Client configuration (`surfsync.toml`).
//!
//! Every field has a default, so an empty or partial file is valid. Command
//! line flags override whatever the file sets.

use crate::chunker::DEFAULT_BLOCK_SIZE;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default metadata authority address
pub const DEFAULT_META_ADDR: &str = "127.0.0.1:8080";

/// Settings for one sync client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory kept in sync
    pub base_dir: PathBuf,
    /// Block size in bytes; must match every other client of the same authority
    pub block_size: usize,
    /// Metadata authority address (host:port)
    pub meta_addr: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            block_size: DEFAULT_BLOCK_SIZE,
            meta_addr: DEFAULT_META_ADDR.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn new(base_dir: impl Into<PathBuf>, block_size: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            block_size,
            ..Self::default()
        }
    }

    /// Load a TOML config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))
    }

    /// Expand `~` in the base directory and check the settings are usable.
    pub fn validate(mut self) -> Result<Self> {
        if self.block_size == 0 {
            return Err(SyncError::Config("block_size must be at least 1".into()));
        }
        if self.meta_addr.trim().is_empty() {
            return Err(SyncError::Config("meta_addr must not be empty".into()));
        }

        self.base_dir = expand_tilde(&self.base_dir);
        if !self.base_dir.is_dir() {
            return Err(SyncError::Config(format!(
                "base directory {} does not exist or is not a directory",
                self.base_dir.display()
            )));
        }

        Ok(self)
    }
}

/// Expand tilde (~) in paths to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            home.join(rest)
        } else {
            path.to_path_buf()
        }
    } else {
        path.to_path_buf()
    }
}
