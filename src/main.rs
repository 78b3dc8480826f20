use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use surfsync::config::{SyncConfig, DEFAULT_META_ADDR};
use surfsync::index::LocalIndex;
use surfsync::server::{run_block_server, run_meta_server};
use surfsync::{BlockStore, MetaStore, RpcClient, SyncEngine};

#[derive(Parser)]
#[command(name = "surfsync")]
#[command(version)]
#[command(about = "Block-level directory sync against a central metadata authority")]
#[command(long_about = r#"
surfsync keeps a flat directory in sync across clients.

A metadata authority holds filename -> (version, block hashes); a block store
holds the blocks. Each `sync` run reconciles the local directory once.

Examples:
  surfsync blocks --listen 127.0.0.1:8081
  surfsync meta --listen 127.0.0.1:8080 --block-store 127.0.0.1:8081
  surfsync sync --dir ./drive --meta 127.0.0.1:8080 --block-size 4096
  surfsync inspect --dir ./drive
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the metadata authority
    Meta {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_META_ADDR, env = "SURFSYNC_META_LISTEN")]
        listen: String,

        /// Block store address handed to clients
        #[arg(short, long, env = "SURFSYNC_BLOCK_STORE")]
        block_store: String,
    },

    /// Run the block store
    Blocks {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8081", env = "SURFSYNC_BLOCKS_LISTEN")]
        listen: String,
    },

    /// Run one reconciliation pass
    Sync {
        /// TOML config file (base_dir, block_size, meta_addr)
        #[arg(short, long, env = "SURFSYNC_CONFIG")]
        config: Option<PathBuf>,

        /// Directory to sync
        #[arg(short, long, env = "SURFSYNC_DIR")]
        dir: Option<PathBuf>,

        /// Metadata authority address
        #[arg(short, long, env = "SURFSYNC_META")]
        meta: Option<String>,

        /// Block size in bytes
        #[arg(short, long, env = "SURFSYNC_BLOCK_SIZE")]
        block_size: Option<usize>,

        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,

        /// Exit non-zero if any file failed to sync
        #[arg(long)]
        strict: bool,
    },

    /// Print the local index of a directory
    Inspect {
        /// Synced directory
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Meta {
            listen,
            block_store,
        } => {
            run_meta_server(&listen, Arc::new(MetaStore::new(block_store))).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Blocks { listen } => {
            run_block_server(&listen, Arc::new(BlockStore::new())).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync {
            config,
            dir,
            meta,
            block_size,
            json,
            strict,
        } => {
            let mut settings = match config {
                Some(path) => SyncConfig::load(&path)?,
                None => SyncConfig::default(),
            };
            if let Some(dir) = dir {
                settings.base_dir = dir;
            }
            if let Some(meta) = meta {
                settings.meta_addr = meta;
            }
            if let Some(block_size) = block_size {
                settings.block_size = block_size;
            }
            let settings = settings.validate()?;

            let client = RpcClient::new(settings.meta_addr.clone());
            let engine = SyncEngine::new(&settings, client.clone(), client);
            let report = engine.run_pass().await.context("Sync pass aborted")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "uploaded {}, downloaded {}, unchanged {}, conflicted {}, failed {}",
                    report.uploaded.len(),
                    report.downloaded.len(),
                    report.unchanged.len(),
                    report.conflicted.len(),
                    report.failed.len()
                );
                for failure in &report.failed {
                    println!("  failed {}: {}", failure.filename, failure.error);
                }
            }

            if strict && !report.is_clean() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::Inspect { dir, json } => {
            let index = LocalIndex::load(&dir)?;
            if json {
                let entries: Vec<_> = index.iter().collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("{} ({} files)", index.path().display(), index.len());
                for meta in index.iter() {
                    println!("  {} v{}", meta.filename, meta.version);
                    for hash in &meta.block_hash_list {
                        println!("    {}", hash);
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
