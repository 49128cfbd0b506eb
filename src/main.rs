// ABOUTME: Main entry point for the Workspace Hub server and its thin terminal client

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use workspace_hub::client;
use workspace_hub::config::{ServerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
use workspace_hub::server::{run_server, spawn_signal_listener};

#[derive(Parser)]
#[command(name = "workspace-hub", version, about = "Multi-user remote workspace server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workspace server
    Serve {
        /// Config file (defaults to ~/.workspace-hub/config.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Address to listen on
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
        /// Root directory holding every user's workspace
        #[arg(long)]
        workspaces: Option<PathBuf>,
        /// Credential database file
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Connect to a running server
    Connect {
        /// Server address
        #[arg(default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
        addr: String,
        /// Directory for downloaded projects and files
        #[arg(long, default_value = ".")]
        download_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            bind,
            workspaces,
            database,
        } => {
            let mut config = ServerConfig::load(config.as_deref())?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(workspaces) = workspaces {
                config.workspaces_root = workspaces;
            }
            if let Some(database) = database {
                config.database_path = database;
            }

            setup_logging(config.log_dir.as_deref());

            let shutdown = CancellationToken::new();
            spawn_signal_listener(shutdown.clone());
            run_server(&config, shutdown).await
        }
        Command::Connect { addr, download_dir } => {
            setup_logging(None);
            client::connect(&addr, &download_dir, DEFAULT_CHUNK_SIZE).await
        }
    }
}

fn setup_logging(log_dir: Option<&Path>) {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "workspace_hub=info".into())
    };

    let file = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Cannot create log directory {}: {}", dir.display(), e);
            return None;
        }
        // Create log file with timestamp
        let log_file = dir.join(format!(
            "workspace-hub-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        match OpenOptions::new().create(true).append(true).open(&log_file) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", log_file.display(), e);
                None
            }
        }
    });

    match file {
        Some(file) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(file)
                    .with_ansi(false), // No ANSI colors in log file
            )
            .with(filter())
            .init(),
        None => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter())
            .init(),
    }
}
