use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use ringfs_client::{ClientConfig, Orchestrator};

mod commands;

#[derive(Parser)]
#[command(name = "ringfs")]
#[command(about = "RingFS distributed file store client")]
#[command(version)]
struct Cli {
    /// Path to client configuration file
    #[arg(short, long, value_name = "FILE", env = "RINGFS_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Node list file, overriding the configured one
    #[arg(short, long, value_name = "FILE")]
    nodes: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored files and whether they can be retrieved
    List,
    /// Store local files in the cluster
    Put {
        /// Local files to store
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Retrieve files from the cluster
    Get {
        /// Names of the files to retrieve
        #[arg(required = true)]
        filenames: Vec<String>,

        /// Directory to write retrieved files into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn init_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
            .add_directive("ringfs_client=warn".parse()?)
            .add_directive("ringfs=info".parse()?)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn build_orchestrator(cli: &Cli) -> Result<Orchestrator> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(nodes) = &cli.nodes {
        config.node_list = nodes.clone();
        config.nodes.clear();
    }
    Ok(Orchestrator::from_config(config)?)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.debug) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    let orchestrator = match build_orchestrator(&cli) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let succeeded = match cli.command {
        Commands::List => commands::list(&orchestrator).await,
        Commands::Put { paths } => commands::put(&orchestrator, &paths).await,
        Commands::Get { filenames, output } => {
            commands::get(&orchestrator, &filenames, &output).await
        }
    };

    if !succeeded {
        process::exit(1);
    }
}
