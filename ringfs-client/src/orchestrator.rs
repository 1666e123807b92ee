//! Cluster-wide list, put and get.
//!
//! Each operation starts from a fresh availability probe; nothing about the
//! cluster is remembered between operations.

use bytes::Bytes;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use ringfs_common::{
    blob_name, parse_blob_name, validate_file_name, ChunkIndex, NodeList, Placement,
    CHUNK_COUNT, CHUNK_QUORUM, MIN_LIVE_NODES,
};

use crate::chunking::{reassemble, split};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::node_client::NodeClient;
use crate::prober::{ClusterView, Prober};

/// Observed state of one file across the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub name: String,
    /// Distinct chunk indices seen on at least one node
    pub chunks: BTreeSet<ChunkIndex>,
    /// How many nodes listed each chunk
    pub replicas: BTreeMap<ChunkIndex, usize>,
    pub complete: bool,
}

/// Result of a cluster listing
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Files sorted by name
    pub files: Vec<FileStatus>,
    /// Nodes that were dead at probe time or did not answer
    pub unreachable: Vec<String>,
}

/// A chunk transfer that went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTransfer {
    pub node: String,
    pub chunk: ChunkIndex,
}

/// A chunk transfer that did not
#[derive(Debug)]
pub struct TransferFailure {
    pub node: String,
    pub chunk: ChunkIndex,
    pub error: ClientError,
}

#[derive(Debug)]
pub struct StoreReport {
    pub file: String,
    pub size: u64,
    pub stored: Vec<ChunkTransfer>,
    pub failures: Vec<TransferFailure>,
}

impl StoreReport {
    /// Distinct chunk indices that reached at least one node
    pub fn stored_chunks(&self) -> BTreeSet<ChunkIndex> {
        self.stored.iter().map(|t| t.chunk).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.stored_chunks().len() >= CHUNK_QUORUM
    }
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub file: String,
    /// Where the reassembled file was written
    pub path: PathBuf,
    pub retrieved: Vec<ChunkIndex>,
    /// Chunks left out of the reassembled file
    pub missing: Vec<ChunkIndex>,
    pub bytes_written: u64,
}

impl FetchReport {
    /// Whether the written file is the full original
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Runs list, put and get against a fixed node list
pub struct Orchestrator {
    config: ClientConfig,
    nodes: NodeList,
    prober: Prober,
}

impl Orchestrator {
    pub fn new(config: ClientConfig, nodes: NodeList) -> Self {
        let prober = Prober::new(config.connect_timeout());
        Self {
            config,
            nodes,
            prober,
        }
    }

    /// Build from configuration alone, reading the node list it names
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let nodes = config.node_list()?;
        info!("Using {} storage nodes", nodes.len());
        Ok(Self::new(config, nodes))
    }

    pub fn nodes(&self) -> &NodeList {
        &self.nodes
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn probe(&self) -> ClusterView {
        self.prober.probe(&self.nodes).await
    }

    fn client(&self, index: usize) -> ClientResult<NodeClient> {
        let node = self.nodes.get(index).ok_or_else(|| {
            ClientError::Configuration(format!("no node at position {}", index))
        })?;
        Ok(NodeClient::new(
            node.clone(),
            self.config.connect_timeout(),
            self.config.io_timeout(),
        ))
    }

    /// List every file any live node holds a chunk of
    pub async fn enumerate(&self) -> ClientResult<Listing> {
        let view = self.probe().await;
        let mut unreachable: Vec<String> = view.unreachable().map(|n| n.name.clone()).collect();

        let queries = view.live().map(|(index, node)| async move {
            let result = match self.client(index) {
                Ok(client) => client.enumerate().await,
                Err(e) => Err(e),
            };
            (node.name.clone(), result)
        });

        let mut replicas: BTreeMap<String, BTreeMap<ChunkIndex, usize>> = BTreeMap::new();
        for (node, result) in join_all(queries).await {
            let blobs = match result {
                Ok(blobs) => blobs,
                Err(e) => {
                    warn!("Skipping {} in listing: {}", node, e);
                    unreachable.push(node);
                    continue;
                }
            };
            for blob in &blobs {
                match parse_blob_name(blob) {
                    Some((file, chunk)) => {
                        *replicas
                            .entry(file.to_string())
                            .or_default()
                            .entry(chunk)
                            .or_insert(0) += 1;
                    }
                    None => debug!("Ignoring foreign blob {} on {}", blob, node),
                }
            }
        }

        let required = self.config.required_chunks();
        let files = replicas
            .into_iter()
            .map(|(name, replicas)| {
                let chunks: BTreeSet<ChunkIndex> = replicas.keys().copied().collect();
                FileStatus {
                    name,
                    complete: chunks.len() >= required,
                    chunks,
                    replicas,
                }
            })
            .collect();

        Ok(Listing { files, unreachable })
    }

    /// Split the local file at `path` and send its chunks to the live nodes
    pub async fn store(&self, path: &Path) -> ClientResult<StoreReport> {
        let file = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidArgument(format!("{} has no usable file name", path.display()))
            })?
            .to_string();
        validate_file_name(&file)?;

        let metadata = fs::metadata(path)
            .await
            .map_err(|e| ClientError::local_io(path, e))?;
        if !metadata.is_file() {
            return Err(ClientError::InvalidArgument(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let view = self.probe().await;
        if view.live_count() < MIN_LIVE_NODES {
            return Err(ClientError::InsufficientRedundancy {
                file,
                what: "live nodes",
                available: view.live_count(),
                required: MIN_LIVE_NODES,
            });
        }

        let data = Bytes::from(fs::read(path).await.map_err(|e| ClientError::local_io(path, e))?);
        let size = data.len() as u64;
        let chunks = split(data);
        let placement = Placement::compute(&file, self.nodes.len())?;
        debug!("Placing {} with rotation {}", file, placement.rotation());

        let mut targets = Vec::new();
        for (index, node) in view.live() {
            if let Some(pair) = placement.chunks_for(index) {
                for chunk in pair {
                    targets.push((index, node.name.clone(), chunk));
                }
            }
        }

        let file_name = file.as_str();
        let chunks = &chunks;
        let transfers = targets.into_iter().map(|(index, node, chunk)| async move {
            let result = match self.client(index) {
                Ok(client) => {
                    client
                        .store(&blob_name(file_name, chunk), chunks[chunk.slot()].clone())
                        .await
                }
                Err(e) => Err(e),
            };
            (node, chunk, result)
        });

        let mut report = StoreReport {
            file: file.clone(),
            size,
            stored: Vec::new(),
            failures: Vec::new(),
        };
        for (node, chunk, result) in join_all(transfers).await {
            match result {
                Ok(()) => report.stored.push(ChunkTransfer { node, chunk }),
                Err(error) => {
                    warn!("Chunk {} of {} not stored on {}: {}", chunk, file, node, error);
                    report.failures.push(TransferFailure { node, chunk, error });
                }
            }
        }

        info!(
            "Stored {} ({} bytes): {} transfers succeeded, {} failed",
            file,
            size,
            report.stored.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Retrieve `file` and write it into `destination`
    pub async fn fetch(&self, file: &str, destination: &Path) -> ClientResult<FetchReport> {
        validate_file_name(file)?;

        let view = self.probe().await;
        let placement = Placement::compute(file, self.nodes.len())?;

        let fetches = ChunkIndex::all().map(|chunk| {
            let view = &view;
            let placement = &placement;
            async move { (chunk, self.fetch_chunk(view, placement, file, chunk).await) }
        });

        let mut retrieved = BTreeMap::new();
        let mut missing = Vec::new();
        for (chunk, data) in join_all(fetches).await {
            match data {
                Some(data) => {
                    retrieved.insert(chunk, data);
                }
                None => missing.push(chunk),
            }
        }

        let required = self.config.required_chunks();
        if retrieved.len() < required {
            return Err(ClientError::InsufficientRedundancy {
                file: file.to_string(),
                what: "chunks",
                available: retrieved.len(),
                required,
            });
        }
        if retrieved.len() < CHUNK_COUNT {
            warn!(
                "{} reassembled from {} of {} chunks; chunks {:?} are left out",
                file,
                retrieved.len(),
                CHUNK_COUNT,
                missing
            );
        }

        let data = reassemble(&retrieved);
        let path = destination.join(file);
        write_file(&path, &data).await?;

        info!("Fetched {} ({} bytes) into {}", file, data.len(), path.display());
        Ok(FetchReport {
            file: file.to_string(),
            path,
            retrieved: retrieved.into_keys().collect(),
            missing,
            bytes_written: data.len() as u64,
        })
    }

    /// Ask each live holder of `chunk` in turn until one returns it
    async fn fetch_chunk(
        &self,
        view: &ClusterView,
        placement: &Placement,
        file: &str,
        chunk: ChunkIndex,
    ) -> Option<Bytes> {
        let name = blob_name(file, chunk);
        for index in placement.holders(chunk).filter(|index| view.is_live(*index)) {
            let client = match self.client(index) {
                Ok(client) => client,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            match client.fetch(&name).await {
                Ok(Some(data)) => return Some(data),
                Ok(None) => debug!("{} not on {}", name, client.node().name),
                Err(e) => warn!("Fetching {} failed: {}", name, e),
            }
        }
        warn!("No live node returned {}", name);
        None
    }
}

/// Write through a temporary file in the same directory, then rename
async fn write_file(path: &Path, data: &[u8]) -> ClientResult<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = directory.join(format!(".{}.part", uuid::Uuid::new_v4().simple()));

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(ClientError::local_io(&temp_path, e));
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(ClientError::local_io(path, e));
    }
    Ok(())
}
