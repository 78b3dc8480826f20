//! Network client for the authority and block store servers.
//!
//! Each call opens a TCP connection, sends one request frame and reads one
//! response frame. No retries: a failed call surfaces as
//! `SyncError::Transport` and the sync engine decides what to abandon.

use crate::blocks::BlockService;
use crate::chunker::Block;
use crate::error::{Result, SyncError};
use crate::meta::{FileInfoMap, FileMetaData, MetadataService, UpdateOutcome};
use crate::rpc::protocol::{
    self as wire, BlockData, BlockStoreAddr, ErrorCode, FileInfoMapMsg, GetBlock, HashList,
    MessageType, PutBlock, Success, UpdateFile, Version,
};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpStream;

/// Client for a metadata authority at `meta_addr`; block calls go to the
/// address passed with each call.
#[derive(Debug, Clone)]
pub struct RpcClient {
    meta_addr: String,
}

/// A response frame, with ERROR frames already decoded
enum Reply {
    Frame(MessageType, Bytes),
    Error(wire::Error),
}

impl RpcClient {
    pub fn new(meta_addr: impl Into<String>) -> Self {
        Self {
            meta_addr: meta_addr.into(),
        }
    }

    pub fn meta_addr(&self) -> &str {
        &self.meta_addr
    }

    async fn call(addr: &str, request: &Bytes) -> anyhow::Result<Reply> {
        let mut stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        wire::write_frame(&mut stream, request).await?;
        let (msg_type, payload) = wire::read_frame(&mut stream).await?;

        if msg_type == MessageType::Error {
            return Ok(Reply::Error(wire::Error::decode(payload)?));
        }
        Ok(Reply::Frame(msg_type, payload))
    }

    /// Send `request` to `addr` and return the payload of the expected reply.
    async fn request(addr: &str, request: Bytes, expect: MessageType) -> Result<Bytes> {
        match Self::call(addr, &request).await {
            Ok(Reply::Frame(msg_type, payload)) if msg_type == expect => Ok(payload),
            Ok(Reply::Frame(msg_type, _)) => Err(SyncError::Transport {
                addr: addr.to_string(),
                message: format!("expected {:?}, got {:?}", expect, msg_type),
            }),
            Ok(Reply::Error(err)) => Err(SyncError::Transport {
                addr: addr.to_string(),
                message: format!("server error {}: {}", err.code, err.message),
            }),
            Err(e) => Err(SyncError::transport(addr, e)),
        }
    }
}

#[async_trait]
impl MetadataService for RpcClient {
    async fn get_file_info_map(&self) -> Result<FileInfoMap> {
        let payload = Self::request(
            &self.meta_addr,
            wire::get_file_info_map_request(),
            MessageType::FileInfoMap,
        )
        .await?;
        let msg = FileInfoMapMsg::decode(payload)
            .map_err(|e| SyncError::transport(&self.meta_addr, e))?;
        Ok(msg.files)
    }

    async fn update_file(&self, meta: &FileMetaData) -> Result<UpdateOutcome> {
        let request = UpdateFile { meta: meta.clone() }.encode();
        let payload = Self::request(&self.meta_addr, request, MessageType::Version).await?;
        let version =
            Version::decode(payload).map_err(|e| SyncError::transport(&self.meta_addr, e))?;
        Ok(UpdateOutcome::from_wire(version.version))
    }

    async fn get_block_store_addr(&self) -> Result<String> {
        let payload = Self::request(
            &self.meta_addr,
            wire::get_block_store_addr_request(),
            MessageType::BlockStoreAddr,
        )
        .await?;
        let msg = BlockStoreAddr::decode(payload)
            .map_err(|e| SyncError::transport(&self.meta_addr, e))?;
        Ok(msg.addr)
    }
}

#[async_trait]
impl BlockService for RpcClient {
    async fn put_block(&self, block: &Block, addr: &str) -> Result<bool> {
        let request = PutBlock {
            block: block.clone(),
        }
        .encode();
        let payload = Self::request(addr, request, MessageType::Success).await?;
        let success = Success::decode(payload).map_err(|e| SyncError::transport(addr, e))?;
        Ok(success.ok)
    }

    async fn get_block(&self, hash: &str, addr: &str) -> Result<Block> {
        let request = GetBlock {
            hash: hash.to_string(),
        }
        .encode();

        let reply = Self::call(addr, &request)
            .await
            .map_err(|e| SyncError::transport(addr, e))?;
        match reply {
            Reply::Frame(MessageType::BlockData, payload) => {
                let msg = BlockData::decode(payload).map_err(|e| SyncError::transport(addr, e))?;
                Ok(msg.block)
            }
            Reply::Error(err) if err.error_code() == Some(ErrorCode::NotFound) => {
                Err(SyncError::MissingBlock {
                    hash: hash.to_string(),
                })
            }
            Reply::Error(err) => Err(SyncError::Transport {
                addr: addr.to_string(),
                message: format!("server error {}: {}", err.code, err.message),
            }),
            Reply::Frame(msg_type, _) => Err(SyncError::Transport {
                addr: addr.to_string(),
                message: format!("expected BlockData, got {:?}", msg_type),
            }),
        }
    }

    async fn has_blocks(&self, hashes: &[String], addr: &str) -> Result<Vec<String>> {
        let request = HashList {
            hashes: hashes.to_vec(),
        }
        .encode_request();
        let payload = Self::request(addr, request, MessageType::BlockHashes).await?;
        let msg = HashList::decode(payload).map_err(|e| SyncError::transport(addr, e))?;
        Ok(msg.hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_authority_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = RpcClient::new(addr.clone());
        let err = client.get_file_info_map().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { addr: a, .. } if a == addr));
    }
}
