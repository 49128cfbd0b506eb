// ABOUTME: Server bootstrap wiring stores, the acceptor and signal-driven shutdown together

pub mod acceptor;
pub mod shutdown;

pub use acceptor::Server;
pub use shutdown::spawn_signal_listener;

use crate::config::ServerConfig;
use crate::session::SessionContext;
use crate::store::{ActionLog, SqliteCredentialStore, WorkspaceStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Open the stores named by `config` and build the shared session context
pub async fn build_context(config: &ServerConfig) -> Result<SessionContext> {
    let credentials = SqliteCredentialStore::open(&config.database_path).with_context(|| {
        format!(
            "Failed to open credential database {}",
            config.database_path.display()
        )
    })?;
    match credentials.user_count() {
        Ok(count) => info!("Credential store has {} registered users", count),
        Err(e) => warn!("Could not count registered users: {}", e),
    }

    let workspace = WorkspaceStore::new(&config.workspaces_root);
    workspace.init().await.with_context(|| {
        format!(
            "Failed to create workspace root {}",
            config.workspaces_root.display()
        )
    })?;

    let action_log = ActionLog::new(&config.action_log_path);
    info!("Recording user actions to {}", action_log.path().display());

    Ok(SessionContext::new(
        Arc::new(credentials),
        workspace,
        action_log,
        config.chunk_size,
    ))
}

/// Run the server until `shutdown` is cancelled
pub async fn run_server(config: &ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let ctx = build_context(config).await?;
    let server = Server::bind(config.bind_addr, ctx, config.shutdown_grace())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Workspace server listening on {}", server.local_addr()?);

    server.run(shutdown).await;
    Ok(())
}
