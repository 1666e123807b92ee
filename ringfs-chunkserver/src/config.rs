use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the ChunkServer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkServerConfig {
    /// Directory holding the chunk blobs
    pub data_dir: PathBuf,

    /// Server bind address
    pub bind_address: String,

    /// Server port
    pub port: u16,

    /// Maximum number of connections served at once
    pub max_connections: usize,

    /// Seconds to wait on a silent peer before giving up on the connection
    pub io_timeout_secs: u64,
}

impl Default for ChunkServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./dfs1"),
            bind_address: "0.0.0.0".to_string(),
            port: 10001,
            max_connections: 256,
            io_timeout_secs: 30,
        }
    }
}

impl ChunkServerConfig {
    /// Load configuration from specific file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let builder = Self::builder_with_defaults()?
            .add_source(config::File::with_name(path.as_ref().to_string_lossy().as_ref()))
            .add_source(config::Environment::with_prefix("RINGFS_CHUNKSERVER"));

        let config: ChunkServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file or environment
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = Self::builder_with_defaults()?;

        if let Ok(config_file) = std::env::var("RINGFS_CHUNKSERVER_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_file));
        } else {
            let config_paths = [
                "/etc/ringfs/chunkserver.toml",
                "./chunkserver.toml",
                "./config/chunkserver.toml",
            ];

            for path in &config_paths {
                if std::path::Path::new(path).exists() {
                    builder = builder.add_source(config::File::with_name(path));
                    break;
                }
            }
        }

        builder = builder.add_source(config::Environment::with_prefix("RINGFS_CHUNKSERVER"));

        let config: ChunkServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn builder_with_defaults(
    ) -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();
        Ok(config::Config::builder()
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?
            .set_default("bind_address", defaults.bind_address)?
            .set_default("port", defaults.port as i64)?
            .set_default("max_connections", defaults.max_connections as i64)?
            .set_default("io_timeout_secs", defaults.io_timeout_secs as i64)?)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("Max connections must be greater than 0"));
        }

        if self.io_timeout_secs == 0 {
            return Err(anyhow::anyhow!("I/O timeout must be greater than 0"));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Data directory must not be empty"));
        }

        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Address the listener binds to
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| {
                anyhow::anyhow!(
                    "Invalid bind address {}:{}: {}",
                    self.bind_address,
                    self.port,
                    e
                )
            })
    }
}
