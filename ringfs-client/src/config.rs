use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ringfs_common::{NodeInfo, NodeList, CHUNK_COUNT, CHUNK_QUORUM};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Node list file (`server <name> <host>:<port>` lines)
    pub node_list: PathBuf,

    /// Nodes given inline; takes precedence over `node_list` when non-empty
    pub nodes: Vec<NodeInfo>,

    /// Connection timeout, also used by the availability probe
    pub connect_timeout_ms: u64,

    /// Timeout for each read or write on an established connection
    pub io_timeout_ms: u64,

    /// Refuse to reassemble a file unless all of its chunks were retrieved
    pub require_all_chunks: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node_list: PathBuf::from("dfc.conf"),
            nodes: Vec::new(),
            connect_timeout_ms: 1000,
            io_timeout_ms: 5000,
            require_all_chunks: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a specific file, with environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path.as_ref().to_string_lossy().as_ref()))
            .add_source(config::Environment::with_prefix("RINGFS_CLIENT"));

        Self::finish(builder)
    }

    /// Load configuration from the usual locations and the environment
    pub fn load() -> ClientResult<Self> {
        let mut builder = config::Config::builder();

        if let Ok(config_file) = std::env::var("RINGFS_CLIENT_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_file));
        } else {
            for path in ["/etc/ringfs/client.toml", "./client.toml"] {
                if Path::new(path).exists() {
                    builder = builder.add_source(config::File::with_name(path));
                    break;
                }
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("RINGFS_CLIENT"));
        Self::finish(builder)
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ClientResult<Self> {
        let config: ClientConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.connect_timeout_ms == 0 {
            return Err(ClientError::Configuration(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.io_timeout_ms == 0 {
            return Err(ClientError::Configuration(
                "io_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.nodes.is_empty() && self.node_list.as_os_str().is_empty() {
            return Err(ClientError::Configuration(
                "either nodes or node_list must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured storage nodes, in placement order
    pub fn node_list(&self) -> ClientResult<NodeList> {
        let nodes = if self.nodes.is_empty() {
            NodeList::from_file(&self.node_list)?
        } else {
            NodeList::new(self.nodes.clone())?
        };
        Ok(nodes)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Distinct chunks needed before a file counts as complete
    pub fn required_chunks(&self) -> usize {
        if self.require_all_chunks {
            CHUNK_COUNT
        } else {
            CHUNK_QUORUM
        }
    }
}
