//! `list`, `put` and `get`. Each returns whether every file succeeded.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use ringfs_client::{ClientError, Orchestrator};

pub async fn list(orchestrator: &Orchestrator) -> bool {
    let listing = match orchestrator.enumerate().await {
        Ok(listing) => listing,
        Err(e) => {
            eprintln!("Error: {}", e);
            return false;
        }
    };

    if !listing.unreachable.is_empty() {
        warn!("Unreachable nodes: {}", listing.unreachable.join(", "));
    }

    for file in &listing.files {
        if file.complete {
            println!("{}", file.name);
        } else {
            println!("{} [incomplete]", file.name);
        }
    }
    true
}

pub async fn put(orchestrator: &Orchestrator, paths: &[PathBuf]) -> bool {
    let mut all_ok = true;
    for path in paths {
        let name = display_name(path);
        match orchestrator.store(path).await {
            Ok(report) if report.is_complete() => {
                for failure in &report.failures {
                    warn!(
                        "Chunk {} not stored on {}: {}",
                        failure.chunk, failure.node, failure.error
                    );
                }
                info!("{} stored ({} bytes)", report.file, report.size);
            }
            Ok(report) => {
                for failure in &report.failures {
                    warn!(
                        "Chunk {} not stored on {}: {}",
                        failure.chunk, failure.node, failure.error
                    );
                }
                println!("{} put failed", name);
                all_ok = false;
            }
            Err(ClientError::InsufficientRedundancy { .. }) => {
                println!("{} put failed", name);
                all_ok = false;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                all_ok = false;
            }
        }
    }
    all_ok
}

pub async fn get(orchestrator: &Orchestrator, filenames: &[String], output: &Path) -> bool {
    let mut all_ok = true;
    for filename in filenames {
        match orchestrator.fetch(filename, output).await {
            Ok(report) => {
                if !report.is_exact() {
                    warn!(
                        "{} was written without chunks {:?}",
                        report.file, report.missing
                    );
                }
                info!("{} written to {}", report.file, report.path.display());
            }
            Err(ClientError::InsufficientRedundancy { .. }) => {
                println!("{} is incomplete", filename);
                all_ok = false;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                all_ok = false;
            }
        }
    }
    all_ok
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
