use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use ringfs_chunkserver::{ChunkServer, ChunkServerConfig};

async fn start_server(temp_dir: &TempDir) -> SocketAddr {
    start_server_with(temp_dir, ChunkServerConfig::default().max_connections).await
}

async fn start_server_with(temp_dir: &TempDir, max_connections: usize) -> SocketAddr {
    let config = ChunkServerConfig {
        data_dir: temp_dir.path().join("dfs1"),
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        max_connections,
        io_timeout_secs: 1,
    };
    let server = ChunkServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_stores_to_distinct_names() {
    let temp_dir = TempDir::new().unwrap();
    let addr = start_server(&temp_dir).await;

    let mut tasks = Vec::new();
    for i in 0..32u32 {
        tasks.push(tokio::spawn(async move {
            let payload = vec![i as u8; 4096 + i as usize];
            let name = format!("file{:02}.{}", i, i % 4 + 1);
            let mut request = format!("STORE {} {}\n", payload.len(), name).into_bytes();
            request.extend_from_slice(&payload);
            exchange(addr, &request).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), b"OK\nSUCCESS\n");
    }

    let listing = String::from_utf8(exchange(addr, b"ENUMERATE\n").await).unwrap();
    let blobs: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.strip_prefix("BLOB "))
        .collect();
    assert_eq!(blobs.len(), 32);
    assert_eq!(blobs[0], "file00.1");

    let fetched = exchange(addr, b"FETCH file05.2\n").await;
    let header = b"DATA 4101\n";
    assert_eq!(&fetched[..header.len()], header);
    assert!(fetched[header.len()..].iter().all(|b| *b == 5));
    assert_eq!(fetched.len() - header.len(), 4101);
}

#[tokio::test]
async fn test_stalled_store_does_not_block_others() {
    let temp_dir = TempDir::new().unwrap();
    let addr = start_server(&temp_dir).await;

    // Announces 100 bytes, sends 10 and goes quiet
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"STORE 100 slow.1\n0123456789").await.unwrap();

    let response = tokio::time::timeout(
        Duration::from_millis(500),
        exchange(addr, b"STORE 4 fast.1\nfast"),
    )
    .await
    .unwrap();
    assert_eq!(response, b"OK\nSUCCESS\n");

    // The stalled peer is cut off after the I/O timeout and its blob discarded
    let mut rest = Vec::new();
    stalled.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, b"OK\nFAILED\n");

    let listing = exchange(addr, b"ENUMERATE\n").await;
    assert_eq!(listing, b"OK\nBLOB fast.1\nEND\n");
}

#[tokio::test]
async fn test_stalled_fetch_reader_releases_its_slot() {
    let temp_dir = TempDir::new().unwrap();
    let addr = start_server_with(&temp_dir, 1).await;
    std::fs::write(temp_dir.path().join("dfs1").join("big.1"), vec![1u8; 32 << 20]).unwrap();

    // Asks for far more than the socket buffers hold and never reads
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"FETCH big.1\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let listing = tokio::time::timeout(Duration::from_secs(5), exchange(addr, b"ENUMERATE\n"))
        .await
        .unwrap();
    assert_eq!(listing, b"OK\nBLOB big.1\nEND\n");
    drop(stalled);
}
