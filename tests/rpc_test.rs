//! Full passes over TCP: real servers on ephemeral ports, `RpcClient` on the
//! client side.

use std::fs;
use std::sync::Arc;
use surfsync::blocks::BlockService;
use surfsync::meta::{FileMetaData, MetadataService, UpdateOutcome};
use surfsync::rpc::protocol::{self, MessageType};
use surfsync::server::serve;
use surfsync::{block_hash, Block, BlockStore, MetaStore, RpcClient, SyncConfig, SyncEngine, SyncError};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};

struct Servers {
    meta_addr: String,
    block_addr: String,
    meta: Arc<MetaStore>,
    blocks: Arc<BlockStore>,
}

async fn start_servers() -> Servers {
    let block_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let block_addr = block_listener.local_addr().unwrap().to_string();
    let blocks = Arc::new(BlockStore::new());
    tokio::spawn(serve(block_listener, Arc::clone(&blocks)));

    let meta_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let meta_addr = meta_listener.local_addr().unwrap().to_string();
    let meta = Arc::new(MetaStore::new(block_addr.clone()));
    tokio::spawn(serve(meta_listener, Arc::clone(&meta)));

    Servers {
        meta_addr,
        block_addr,
        meta,
        blocks,
    }
}

fn engine(dir: &TempDir, meta_addr: &str) -> SyncEngine<RpcClient, RpcClient> {
    let client = RpcClient::new(meta_addr);
    let config = SyncConfig::new(dir.path(), 8);
    SyncEngine::new(&config, client.clone(), client)
}

#[tokio::test]
async fn test_two_clients_sync_over_tcp() {
    let servers = start_servers().await;
    let a_dir = TempDir::new().unwrap();
    let b_dir = TempDir::new().unwrap();
    fs::write(a_dir.path().join("report.txt"), b"quarterly numbers, all good").unwrap();
    fs::write(b_dir.path().join("photo.raw"), vec![7u8; 100]).unwrap();

    let a = engine(&a_dir, &servers.meta_addr);
    let b = engine(&b_dir, &servers.meta_addr);

    let report = a.run_pass().await.unwrap();
    assert_eq!(report.uploaded, vec!["report.txt"]);
    b.run_pass().await.unwrap();
    a.run_pass().await.unwrap();

    assert_eq!(fs::read(a_dir.path().join("photo.raw")).unwrap(), vec![7u8; 100]);
    assert_eq!(
        fs::read(b_dir.path().join("report.txt")).unwrap(),
        b"quarterly numbers, all good"
    );
    assert_eq!(servers.meta.len(), 2);

    // photo.raw is 100 identical bytes: 13 blocks, 2 distinct
    assert_eq!(servers.blocks.stats().count, 4 + 2);
}

#[tokio::test]
async fn test_authority_calls_round_trip() {
    let servers = start_servers().await;
    let client = RpcClient::new(servers.meta_addr.clone());

    assert_eq!(client.get_block_store_addr().await.unwrap(), servers.block_addr);
    assert!(client.get_file_info_map().await.unwrap().is_empty());

    let v1 = FileMetaData::new("f", 1, vec![block_hash(b"one")]);
    assert_eq!(client.update_file(&v1).await.unwrap(), UpdateOutcome::Accepted(1));
    assert_eq!(client.update_file(&v1).await.unwrap(), UpdateOutcome::Conflict);

    let v3 = FileMetaData::new("f", 3, vec![]);
    assert_eq!(client.update_file(&v3).await.unwrap(), UpdateOutcome::Conflict);

    let map = client.get_file_info_map().await.unwrap();
    assert_eq!(map["f"], v1);
}

#[tokio::test]
async fn test_block_calls_round_trip() {
    let servers = start_servers().await;
    let client = RpcClient::new(servers.meta_addr.clone());
    let addr = servers.block_addr.as_str();

    let block = Block::new(&b"some block bytes"[..]);
    assert!(client.put_block(&block, addr).await.unwrap());

    let fetched = client.get_block(&block.hash, addr).await.unwrap();
    assert_eq!(fetched.data, block.data);

    let absent = block_hash(b"never stored");
    let present = client
        .has_blocks(&[absent.clone(), block.hash.clone()], addr)
        .await
        .unwrap();
    assert_eq!(present, vec![block.hash.clone()]);

    let err = client.get_block(&absent, addr).await.unwrap_err();
    assert!(matches!(err, SyncError::MissingBlock { hash } if hash == absent));
}

#[tokio::test]
async fn test_server_survives_bad_request() {
    let servers = start_servers().await;
    let mut stream = TcpStream::connect(&servers.meta_addr).await.unwrap();

    // A block-store message sent to the authority
    let bogus = protocol::HashList { hashes: vec![] }.encode_request();
    protocol::write_frame(&mut stream, &bogus).await.unwrap();
    let (msg_type, payload) = protocol::read_frame(&mut stream).await.unwrap();
    assert_eq!(msg_type, MessageType::Error);
    let err = protocol::Error::decode(payload).unwrap();
    assert_eq!(err.error_code(), Some(protocol::ErrorCode::BadRequest));

    // Same connection still answers
    protocol::write_frame(&mut stream, &protocol::get_block_store_addr_request())
        .await
        .unwrap();
    let (msg_type, _) = protocol::read_frame(&mut stream).await.unwrap();
    assert_eq!(msg_type, MessageType::BlockStoreAddr);
}
