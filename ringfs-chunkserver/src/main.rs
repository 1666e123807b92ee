use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ringfs_chunkserver::{ChunkServer, ChunkServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "RingFS chunk server", long_about = None)]
struct Args {
    /// Data directory (positional form: `ringfs-chunkserver <data_dir> <port>`)
    #[arg(value_name = "DATA_DIR", conflicts_with = "data_dir")]
    positional_data_dir: Option<PathBuf>,

    /// Port (positional form)
    #[arg(value_name = "PORT", requires = "positional_data_dir", conflicts_with = "port")]
    positional_port: Option<u16>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override bind address
    #[arg(long)]
    bind_address: Option<String>,

    /// Override port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override data directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("ringfs_chunkserver=info".parse()?)
            .add_directive("ringfs_protocol=info".parse()?)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting RingFS chunk server");

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        ChunkServerConfig::from_file(config_path)?
    } else {
        ChunkServerConfig::load()?
    };

    if let Some(bind_address) = args.bind_address {
        config.bind_address = bind_address;
    }
    if let Some(port) = args.port.or(args.positional_port) {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir.or(args.positional_data_dir) {
        config.data_dir = data_dir;
    }

    info!("Configuration: {:?}", config);

    let server = ChunkServer::bind(config).await?;

    server
        .serve(async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => {
                    error!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await
                }
            }
        })
        .await?;

    info!("Chunk server shut down gracefully");
    Ok(())
}
