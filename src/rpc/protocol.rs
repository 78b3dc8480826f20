//! Request/response messages for the authority and block store services.
//!
//! Wire format: all multi-byte integers are big-endian.
//! Strings are length-prefixed (u16 len + UTF-8), byte blobs are u32 len +
//! bytes, lists are u32 count + items.
//! Frame format: len:u32 | type:u8 | payload (len counts the payload only)

use crate::chunker::Block;
use crate::meta::{FileInfoMap, FileMetaData};
use anyhow::{Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload (64MB)
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

// =============================================================================
// Message Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    GetFileInfoMap = 0x01,
    FileInfoMap = 0x02,
    UpdateFile = 0x03,
    Version = 0x04,
    GetBlockStoreAddr = 0x05,
    BlockStoreAddr = 0x06,
    PutBlock = 0x07,
    Success = 0x08,
    GetBlock = 0x09,
    BlockData = 0x0A,
    HasBlocks = 0x0B,
    BlockHashes = 0x0C,
    Error = 0x0D,
}

impl MessageType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::GetFileInfoMap),
            0x02 => Some(Self::FileInfoMap),
            0x03 => Some(Self::UpdateFile),
            0x04 => Some(Self::Version),
            0x05 => Some(Self::GetBlockStoreAddr),
            0x06 => Some(Self::BlockStoreAddr),
            0x07 => Some(Self::PutBlock),
            0x08 => Some(Self::Success),
            0x09 => Some(Self::GetBlock),
            0x0A => Some(Self::BlockData),
            0x0B => Some(Self::HasBlocks),
            0x0C => Some(Self::BlockHashes),
            0x0D => Some(Self::Error),
            _ => None,
        }
    }
}

// =============================================================================
// Error Codes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NotFound = 1,
    BadRequest = 2,
    Internal = 3,
}

impl ErrorCode {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(Self::NotFound),
            2 => Some(Self::BadRequest),
            3 => Some(Self::Internal),
            _ => None,
        }
    }
}

// =============================================================================
// Field helpers
// =============================================================================

fn frame(msg_type: MessageType, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u8(msg_type as u8);
    buf.put_slice(payload);
    buf.freeze()
}

fn empty_frame(msg_type: MessageType) -> Bytes {
    frame(msg_type, &[])
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn get_str(payload: &mut Bytes, what: &str) -> Result<String> {
    if payload.remaining() < 2 {
        anyhow::bail!("{} length truncated", what);
    }
    let len = payload.get_u16() as usize;
    if payload.remaining() < len {
        anyhow::bail!(
            "{} truncated: expected {} bytes, got {}",
            what,
            len,
            payload.remaining()
        );
    }
    String::from_utf8(payload.copy_to_bytes(len).to_vec())
        .with_context(|| format!("Invalid UTF-8 in {}", what))
}

fn get_count(payload: &mut Bytes, what: &str) -> Result<usize> {
    if payload.remaining() < 4 {
        anyhow::bail!("{} count truncated", what);
    }
    Ok(payload.get_u32() as usize)
}

fn put_hashes(buf: &mut BytesMut, hashes: &[String]) {
    buf.put_u32(hashes.len() as u32);
    for hash in hashes {
        put_str(buf, hash);
    }
}

fn get_hashes(payload: &mut Bytes) -> Result<Vec<String>> {
    let count = get_count(payload, "Hash list")?;
    // Each hash needs at least its u16 length prefix
    if payload.remaining() < count.saturating_mul(2) {
        anyhow::bail!("Hash list truncated");
    }
    (0..count).map(|_| get_str(payload, "block hash")).collect()
}

fn put_meta(buf: &mut BytesMut, meta: &FileMetaData) {
    put_str(buf, &meta.filename);
    buf.put_i32(meta.version);
    put_hashes(buf, &meta.block_hash_list);
}

fn get_meta(payload: &mut Bytes) -> Result<FileMetaData> {
    let filename = get_str(payload, "filename")?;
    if payload.remaining() < 4 {
        anyhow::bail!("FileMetaData version truncated");
    }
    let version = payload.get_i32();
    let block_hash_list = get_hashes(payload)?;
    Ok(FileMetaData {
        filename,
        version,
        block_hash_list,
    })
}

fn put_block(buf: &mut BytesMut, block: &Block) {
    put_str(buf, &block.hash);
    buf.put_u32(block.data.len() as u32);
    buf.put_slice(&block.data);
}

fn get_block(payload: &mut Bytes) -> Result<Block> {
    let hash = get_str(payload, "block hash")?;
    if payload.remaining() < 4 {
        anyhow::bail!("Block length truncated");
    }
    let len = payload.get_u32() as usize;
    if payload.remaining() < len {
        anyhow::bail!(
            "Block data truncated: expected {} bytes, got {}",
            len,
            payload.remaining()
        );
    }
    Ok(Block {
        hash,
        data: payload.copy_to_bytes(len),
    })
}

// =============================================================================
// Authority requests
// =============================================================================

pub fn get_file_info_map_request() -> Bytes {
    empty_frame(MessageType::GetFileInfoMap)
}

pub fn get_block_store_addr_request() -> Bytes {
    empty_frame(MessageType::GetBlockStoreAddr)
}

/// UPDATE_FILE (0x03)
#[derive(Debug, Clone)]
pub struct UpdateFile {
    pub meta: FileMetaData,
}

impl UpdateFile {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_meta(&mut buf, &self.meta);
        frame(MessageType::UpdateFile, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            meta: get_meta(&mut payload).context("Bad UpdateFile payload")?,
        })
    }
}

// =============================================================================
// Authority responses
// =============================================================================

/// FILE_INFO_MAP (0x02)
#[derive(Debug, Clone, Default)]
pub struct FileInfoMapMsg {
    pub files: FileInfoMap,
}

impl FileInfoMapMsg {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(self.files.len() as u32);
        for meta in self.files.values() {
            put_meta(&mut buf, meta);
        }
        frame(MessageType::FileInfoMap, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        let count = get_count(&mut payload, "FileInfoMap")?;
        let mut files = FileInfoMap::new();
        for _ in 0..count {
            let meta = get_meta(&mut payload).context("Bad FileInfoMap entry")?;
            files.insert(meta.filename.clone(), meta);
        }
        Ok(Self { files })
    }
}

/// VERSION (0x04): new version, or -1 on conflict
#[derive(Debug, Clone, Copy)]
pub struct Version {
    pub version: i32,
}

impl Version {
    pub fn encode(&self) -> Bytes {
        frame(MessageType::Version, &self.version.to_be_bytes())
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < 4 {
            anyhow::bail!("Version payload too short");
        }
        Ok(Self {
            version: payload.get_i32(),
        })
    }
}

/// BLOCK_STORE_ADDR (0x06)
#[derive(Debug, Clone)]
pub struct BlockStoreAddr {
    pub addr: String,
}

impl BlockStoreAddr {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_str(&mut buf, &self.addr);
        frame(MessageType::BlockStoreAddr, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            addr: get_str(&mut payload, "block store address")?,
        })
    }
}

// =============================================================================
// Block store requests
// =============================================================================

/// PUT_BLOCK (0x07)
#[derive(Debug, Clone)]
pub struct PutBlock {
    pub block: Block,
}

impl PutBlock {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.block.hash.len() + 4 + self.block.size());
        put_block(&mut buf, &self.block);
        frame(MessageType::PutBlock, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            block: get_block(&mut payload).context("Bad PutBlock payload")?,
        })
    }
}

/// GET_BLOCK (0x09)
#[derive(Debug, Clone)]
pub struct GetBlock {
    pub hash: String,
}

impl GetBlock {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_str(&mut buf, &self.hash);
        frame(MessageType::GetBlock, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            hash: get_str(&mut payload, "block hash")?,
        })
    }
}

/// HAS_BLOCKS (0x0B) request and BLOCK_HASHES (0x0C) response share a body.
#[derive(Debug, Clone, Default)]
pub struct HashList {
    pub hashes: Vec<String>,
}

impl HashList {
    pub fn encode_request(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_hashes(&mut buf, &self.hashes);
        frame(MessageType::HasBlocks, &buf)
    }

    pub fn encode_response(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_hashes(&mut buf, &self.hashes);
        frame(MessageType::BlockHashes, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            hashes: get_hashes(&mut payload)?,
        })
    }
}

// =============================================================================
// Block store responses
// =============================================================================

/// SUCCESS (0x08)
#[derive(Debug, Clone, Copy)]
pub struct Success {
    pub ok: bool,
}

impl Success {
    pub fn encode(&self) -> Bytes {
        frame(MessageType::Success, &[u8::from(self.ok)])
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < 1 {
            anyhow::bail!("Success payload too short");
        }
        Ok(Self {
            ok: payload.get_u8() != 0,
        })
    }
}

/// BLOCK_DATA (0x0A)
#[derive(Debug, Clone)]
pub struct BlockData {
    pub block: Block,
}

impl BlockData {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.block.hash.len() + 4 + self.block.size());
        put_block(&mut buf, &self.block);
        frame(MessageType::BlockData, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        Ok(Self {
            block: get_block(&mut payload).context("Bad BlockData payload")?,
        })
    }
}

// =============================================================================
// ERROR (0x0D)
// =============================================================================

#[derive(Debug, Clone)]
pub struct Error {
    pub code: u16,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as u16,
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_u16(self.code)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16(self.code);
        put_str(&mut buf, &self.message);
        frame(MessageType::Error, &buf)
    }

    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.remaining() < 2 {
            anyhow::bail!("Error payload too short");
        }
        let code = payload.get_u16();
        let message = get_str(&mut payload, "error message")?;
        Ok(Self { code, message })
    }
}

// =============================================================================
// Framing
// =============================================================================

pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> Result<(MessageType, Bytes)> {
    let len = r.read_u32().await.context("Failed to read frame length")?;

    // Validate frame size before allocation
    if len > MAX_FRAME_SIZE {
        anyhow::bail!(
            "Frame size {} exceeds maximum allowed size {}",
            len,
            MAX_FRAME_SIZE
        );
    }

    let msg_type = r.read_u8().await.context("Failed to read message type")?;
    let msg_type = MessageType::from_u8(msg_type).context("Unknown message type")?;

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload)
        .await
        .context("Failed to read frame payload")?;

    Ok((msg_type, Bytes::from(payload)))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Bytes) -> Result<()> {
    w.write_all(frame).await.context("Failed to write frame")?;
    w.flush().await.context("Failed to flush frame")?;
    Ok(())
}

/// Whether a `read_frame` error means the peer closed the connection cleanly
/// between frames.
pub fn is_disconnect(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::UnexpectedEof)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::block_hash;

    fn payload_of(encoded: &Bytes) -> Bytes {
        // Skip frame header (4 bytes len + 1 byte type)
        Bytes::copy_from_slice(&encoded[5..])
    }

    fn sample_meta(name: &str, version: i32) -> FileMetaData {
        FileMetaData::new(name, version, vec![block_hash(b"a"), block_hash(b"b")])
    }

    #[test]
    fn test_frame_header() {
        let encoded = Version { version: 7 }.encode();
        assert_eq!(&encoded[..4], &4u32.to_be_bytes());
        assert_eq!(encoded[4], MessageType::Version as u8);
    }

    #[test]
    fn test_file_info_map_roundtrip() {
        let mut files = FileInfoMap::new();
        files.insert("a.txt".into(), sample_meta("a.txt", 1));
        files.insert("b.txt".into(), FileMetaData::new("b.txt", 3, vec![]));

        let encoded = FileInfoMapMsg { files: files.clone() }.encode();
        let decoded = FileInfoMapMsg::decode(payload_of(&encoded)).unwrap();
        assert_eq!(decoded.files, files);
    }

    #[test]
    fn test_conflict_version_survives_wire() {
        let encoded = Version { version: -1 }.encode();
        let decoded = Version::decode(payload_of(&encoded)).unwrap();
        assert_eq!(decoded.version, -1);
    }

    #[test]
    fn test_block_roundtrip() {
        let block = Block::new(Bytes::from_static(b"block bytes"));
        let encoded = PutBlock {
            block: block.clone(),
        }
        .encode();
        let decoded = PutBlock::decode(payload_of(&encoded)).unwrap();
        assert_eq!(decoded.block, block);
        assert!(decoded.block.verify());
    }

    #[test]
    fn test_truncated_payloads_rejected() {
        let encoded = UpdateFile {
            meta: sample_meta("x", 2),
        }
        .encode();
        let payload = payload_of(&encoded);
        for cut in [0, 1, 5, payload.len() - 1] {
            assert!(
                UpdateFile::decode(payload.slice(..cut)).is_err(),
                "accepted payload cut at {cut}"
            );
        }
    }

    #[test]
    fn test_error_roundtrip() {
        let encoded = Error::new(ErrorCode::NotFound, "no such block").encode();
        let decoded = Error::decode(payload_of(&encoded)).unwrap();
        assert_eq!(decoded.error_code(), Some(ErrorCode::NotFound));
        assert_eq!(decoded.message, "no such block");
    }

    #[test]
    fn test_unknown_message_type() {
        assert_eq!(MessageType::from_u8(0x00), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
        assert_eq!(MessageType::from_u8(0x0A), Some(MessageType::BlockData));
    }

    #[tokio::test]
    async fn test_read_write_frame() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let hashes = HashList {
            hashes: vec![block_hash(b"one")],
        };

        write_frame(&mut client, &hashes.encode_request())
            .await
            .unwrap();
        let (msg_type, payload) = read_frame(&mut server).await.unwrap();

        assert_eq!(msg_type, MessageType::HasBlocks);
        assert_eq!(HashList::decode(payload).unwrap().hashes, hashes.hashes);
    }

    #[tokio::test]
    async fn test_disconnect_detected() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(is_disconnect(&err));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let mut header = BytesMut::new();
        header.put_u32(MAX_FRAME_SIZE + 1);
        header.put_u8(MessageType::PutBlock as u8);
        write_frame(&mut client, &header.freeze()).await.unwrap();

        assert!(read_frame(&mut server).await.is_err());
    }
}
