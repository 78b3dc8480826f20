//! TCP servers for the metadata authority and the block store.
//!
//! Every accepted connection runs in its own task and handles request frames
//! one at a time until the peer disconnects. A request that cannot be decoded
//! gets an ERROR frame back; the connection stays usable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

use crate::blocks::BlockStore;
use crate::meta::MetaStore;
use crate::rpc::protocol::{
    self as v1, BlockData, BlockStoreAddr, ErrorCode, FileInfoMapMsg, GetBlock, HashList,
    MessageType, PutBlock, Success, UpdateFile, Version,
};

/// Turns one request frame into one response frame.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, msg_type: MessageType, payload: Bytes) -> Result<Bytes>;
}

fn unexpected(msg_type: MessageType) -> Bytes {
    v1::Error::new(
        ErrorCode::BadRequest,
        format!("Unexpected message {:?}", msg_type),
    )
    .encode()
}

#[async_trait]
impl Handler for MetaStore {
    async fn handle(&self, msg_type: MessageType, payload: Bytes) -> Result<Bytes> {
        match msg_type {
            MessageType::GetFileInfoMap => Ok(FileInfoMapMsg {
                files: self.file_info_map(),
            }
            .encode()),
            MessageType::UpdateFile => {
                let request = UpdateFile::decode(payload)?;
                let outcome = self.update(&request.meta);
                Ok(Version {
                    version: outcome.to_wire(),
                }
                .encode())
            }
            MessageType::GetBlockStoreAddr => Ok(BlockStoreAddr {
                addr: self.block_store_addr().to_string(),
            }
            .encode()),
            other => Ok(unexpected(other)),
        }
    }
}

#[async_trait]
impl Handler for BlockStore {
    async fn handle(&self, msg_type: MessageType, payload: Bytes) -> Result<Bytes> {
        match msg_type {
            MessageType::PutBlock => {
                let request = PutBlock::decode(payload)?;
                Ok(Success {
                    ok: self.put(&request.block),
                }
                .encode())
            }
            MessageType::GetBlock => {
                let request = GetBlock::decode(payload)?;
                match self.get(&request.hash) {
                    Some(block) => Ok(BlockData { block }.encode()),
                    None => Ok(v1::Error::new(
                        ErrorCode::NotFound,
                        format!("Block {} not found", request.hash),
                    )
                    .encode()),
                }
            }
            MessageType::HasBlocks => {
                let request = HashList::decode(payload)?;
                Ok(HashList {
                    hashes: self.has(&request.hashes),
                }
                .encode_response())
            }
            other => Ok(unexpected(other)),
        }
    }
}

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept connections forever, serving each with `handler`. A failed accept
/// is logged and retried; it never stops the server.
pub async fn serve<H: Handler>(listener: TcpListener, handler: Arc<H>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            tracing::debug!(%peer, "Connection opened");
            if let Err(e) = serve_connection(stream, handler.as_ref()).await {
                tracing::warn!(%peer, error = %format!("{e:#}"), "Connection failed");
            }
        });
    }
}

async fn serve_connection<H: Handler>(mut stream: TcpStream, handler: &H) -> Result<()> {
    stream.set_nodelay(true)?;

    loop {
        let (msg_type, payload) = match v1::read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(e) if v1::is_disconnect(&e) => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = match handler.handle(msg_type, payload).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(?msg_type, error = %e, "Bad request");
                v1::Error::new(ErrorCode::BadRequest, format!("{e:#}")).encode()
            }
        };

        v1::write_frame(&mut stream, &response).await?;
    }
}

/// Bind `addr` and serve the metadata authority.
pub async fn run_meta_server(addr: &str, store: Arc<MetaStore>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        block_store = store.block_store_addr(),
        "Metadata authority listening"
    );
    serve(listener, store).await
}

/// Bind `addr` and serve the block store.
pub async fn run_block_server(addr: &str, store: Arc<BlockStore>) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %listener.local_addr()?, "Block store listening");
    serve(listener, store).await
}
