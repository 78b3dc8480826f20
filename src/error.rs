use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt local index at line {line}: {reason}")]
    CorruptIndex { line: usize, reason: String },

    #[error("Transport failure talking to {addr}: {message}")]
    Transport { addr: String, message: String },

    #[error("Block {hash} not found in block store")]
    MissingBlock { hash: String },

    #[error("Block {hash} content does not match its hash")]
    CorruptBlock { hash: String },

    #[error("Block store refused block {hash}")]
    BlockRejected { hash: String },

    #[error("{filename} changed while it was being synced")]
    FileChanged { filename: String },

    #[error("{filename} disappeared from the metadata authority")]
    RemoteVanished { filename: String },

    #[error("Authority entry for {filename} cannot be stored in the local index")]
    InvalidRemoteEntry { filename: String },

    #[error("{filename} is already at the highest version")]
    VersionExhausted { filename: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub(crate) fn transport(addr: impl Into<String>, err: anyhow::Error) -> Self {
        SyncError::Transport {
            addr: addr.into(),
            message: format!("{err:#}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
