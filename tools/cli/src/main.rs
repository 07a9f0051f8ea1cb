//! drivesync CLI - Upload local changes to a Google Drive folder.
//!
//! Without a subcommand the tool watches the configured directory and
//! uploads every created or modified file until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use drivesync_common::Error;
use drivesync_storage::gdrive::connect_gdrive;
use drivesync_sync::{SyncConfig, SyncCoordinator, Termination};

#[derive(Parser)]
#[command(name = "drivesync")]
#[command(about = "drivesync - Mirror a local directory into a Google Drive folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON file overriding the built-in configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the sync directory and upload changes (default).
    Watch,

    /// List files visible to the authorized account.
    List {
        /// Maximum number of files to show.
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let builder = FmtSubscriber::builder().with_target(false).compact();
    match std::env::var("RUST_LOG") {
        Ok(_) if !cli.verbose => {
            tracing::subscriber::set_global_default(
                builder.with_env_filter(EnvFilter::from_default_env()).finish(),
            )?;
        }
        _ => {
            tracing::subscriber::set_global_default(builder.with_max_level(level).finish())?;
        }
    }

    let config = load_config(cli.config.as_deref()).await?;

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => cmd_watch(&config).await,
        Commands::List { limit } => {
            cmd_list(&config, limit.unwrap_or(config.list_page_size)).await
        }
    }
}

/// Built-in configuration, optionally overridden from a file.
async fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SyncConfig::load(path)
                .await
                .context("Failed to load configuration")
        }
        None => Ok(SyncConfig::default()),
    }
}

/// Watch the root directory until interrupted.
async fn cmd_watch(config: &SyncConfig) -> Result<()> {
    let gateway = connect_gdrive(&config.gdrive())
        .await
        .context("Failed to authenticate with Google Drive")?;

    let mut coordinator = SyncCoordinator::new(&config.root_dir, gateway);
    let termination = coordinator
        .run(async { tokio::signal::ctrl_c().await.map_err(Error::Io) })
        .await
        .with_context(|| format!("Failed to watch {}", config.root_dir.display()))?;

    finish(termination)
}

/// Exit status for a finished watch loop. The watcher is already stopped.
fn finish(termination: Termination) -> Result<()> {
    match termination {
        Termination::Interrupted => {
            println!("\nProcess Terminated\n");
            Ok(())
        }
        Termination::WatcherClosed => Ok(()),
        Termination::WatcherFault(e) => {
            eprintln!("File watcher failed: {}", e);
            Ok(())
        }
        Termination::SignalFailed(e) => {
            Err(anyhow::Error::new(e).context("Failed to listen for interrupt"))
        }
    }
}

/// Print the first `limit` files.
async fn cmd_list(config: &SyncConfig, limit: usize) -> Result<()> {
    let gateway = connect_gdrive(&config.gdrive())
        .await
        .context("Failed to authenticate with Google Drive")?;

    let files = gateway
        .list_files(limit)
        .await
        .context("Failed to list files")?;

    if files.is_empty() {
        println!("No files found.");
        return Ok(());
    }

    println!("Files:");
    for file in files {
        println!("{}", file);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_means_watch() {
        let cli = Cli::try_parse_from(["drivesync"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_list_with_limit() {
        let cli = Cli::try_parse_from(["drivesync", "-v", "list", "--limit", "3"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::List { limit: Some(3) })));
    }

    #[test]
    fn test_watcher_fault_exits_normally() {
        let fault = Termination::WatcherFault(Error::Watch("inotify queue overflow".to_string()));
        assert!(finish(fault).is_ok());
        assert!(finish(Termination::Interrupted).is_ok());
        assert!(finish(Termination::WatcherClosed).is_ok());

        let signal = Termination::SignalFailed(Error::Io(std::io::Error::other("no handler")));
        assert!(finish(signal).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_file_fails() {
        let result = load_config(Some(Path::new("/nonexistent/drivesync.json"))).await;
        assert!(result.is_err());
    }
}
