//! Main Chunk Server implementation
//!
//! Accepts connections and hands each one to its own task. Tasks share
//! nothing but the blob store, whose only state is the data directory.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ChunkServerConfig;
use crate::error::{ChunkServerError, Result};
use crate::handler::handle_connection;
use crate::storage::{BlobStore, FileBlobStore};

/// A bound, not yet serving, chunk server
pub struct ChunkServer {
    /// Server configuration
    config: Arc<ChunkServerConfig>,

    /// Blob storage shared by all connection tasks
    store: Arc<dyn BlobStore>,

    listener: TcpListener,

    /// Limits the number of connections served at once
    connection_limit: Arc<Semaphore>,
}

impl ChunkServer {
    /// Prepare the data directory and bind the listener
    pub async fn bind(config: ChunkServerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ChunkServerError::Config(e.to_string()))?;
        let addr = config
            .listen_addr()
            .map_err(|e| ChunkServerError::Config(e.to_string()))?;

        let store = FileBlobStore::open_dir(&config.data_dir).await?;
        Self::bind_with_store(config, addr, Arc::new(store)).await
    }

    /// Bind with a caller-supplied blob store
    pub async fn bind_with_store(
        config: ChunkServerConfig,
        addr: SocketAddr,
        store: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            ChunkServerError::Config(format!("Failed to bind {}: {}", addr, e))
        })?;
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));

        info!("Chunk server listening on {}", listener.local_addr()?);

        Ok(Self {
            config: Arc::new(config),
            store,
            listener,
            connection_limit,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ChunkServerConfig {
        &self.config
    }

    /// Serve connections until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let io_timeout = self.config.io_timeout();

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.connection_limit.clone().acquire_owned() => {
                    permit.map_err(|_| {
                        ChunkServerError::Storage("connection limit closed".to_string())
                    })?
                }
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            debug!("Accepted connection from {}", peer);
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, store.as_ref(), io_timeout).await {
                    error!("Request from {} failed: {}", peer, e);
                }
                drop(permit);
            });
        }

        info!("Chunk server on {} stopped accepting connections", self.local_addr()?);
        Ok(())
    }

    /// Serve connections forever
    pub async fn run(self) -> Result<()> {
        self.serve(std::future::pending()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config(temp_dir: &TempDir) -> ChunkServerConfig {
        ChunkServerConfig {
            data_dir: temp_dir.path().join("dfs1"),
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..ChunkServerConfig::default()
        }
    }

    async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_bind_creates_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let server = ChunkServer::bind(config.clone()).await.unwrap();

        assert!(config.data_dir.is_dir());
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_serves_requests_until_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let server = ChunkServer::bind(test_config(&temp_dir)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(async {
            let _ = stop_rx.await;
        }));

        assert_eq!(exchange(addr, b"STORE 3 a.1\nabc").await, "OK\nSUCCESS\n");
        assert_eq!(exchange(addr, b"ENUMERATE\n").await, "OK\nBLOB a.1\nEND\n");
        assert_eq!(exchange(addr, b"FETCH a.1\n").await, "DATA 3\nabc");
        assert_eq!(exchange(addr, b"FETCH b.1\n").await, "NOTFOUND\n");

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_request_does_not_affect_others() {
        let temp_dir = TempDir::new().unwrap();
        let server = ChunkServer::bind(test_config(&temp_dir)).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        // A slow peer holding a connection open must not block others
        let _idle = TcpStream::connect(addr).await.unwrap();

        let garbage = exchange(addr, b"\xff\xfe garbage\n").await;
        assert!(garbage.starts_with("ERROR"));

        assert_eq!(exchange(addr, b"ENUMERATE\n").await, "OK\nEND\n");
    }
}
