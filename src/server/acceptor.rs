// ABOUTME: TCP acceptor that hands every connection to its own supervised session task
// The acceptor only waits for new connections; session I/O never runs on this loop

use crate::error::SessionError;
use crate::models::Session;
use crate::session::{SessionContext, SessionEngine};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub struct Server {
    listener: TcpListener,
    ctx: SessionContext,
    shutdown_grace: Duration,
}

impl Server {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        ctx: SessionContext,
        shutdown_grace: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            ctx,
            shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled. Sessions get a
    /// child token and are given the grace period to reach their next menu
    /// checkpoint before the remaining tasks are aborted.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            listener,
            ctx,
            shutdown_grace,
        } = self;
        let mut sessions: JoinSet<Result<Session, SessionError>> = JoinSet::new();

        info!("Accept loop started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    log_finished(finished);
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }
                        let engine = SessionEngine::new(
                            stream,
                            Some(peer),
                            ctx.clone(),
                            shutdown.child_token(),
                        );
                        let span = info_span!("session", id = %engine.session().id, peer = %peer);
                        info!("Accepted connection from {}", peer);
                        sessions.spawn(engine.run().instrument(span));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        // Avoid spinning on persistent accept errors
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }
        drop(listener);

        let active = sessions.len();
        if active > 0 {
            info!("Waiting up to {:?} for {} active sessions", shutdown_grace, active);
        }
        let drained = tokio::time::timeout(shutdown_grace, async {
            while let Some(finished) = sessions.join_next().await {
                log_finished(finished);
            }
        })
        .await;

        if drained.is_err() {
            warn!("Aborting {} sessions that did not finish in time", sessions.len());
            sessions.abort_all();
            while let Some(finished) = sessions.join_next().await {
                log_finished(finished);
            }
        }
        info!("Accept loop stopped");
    }
}

fn log_finished(finished: Result<Result<Session, SessionError>, JoinError>) {
    match finished {
        Ok(Ok(session)) => info!(
            "Session {} for '{}' finished",
            session.id, session.username
        ),
        Ok(Err(SessionError::Disconnected)) => info!("Client disconnected"),
        Ok(Err(e)) => warn!("Session ended with error: {}", e),
        Err(e) if e.is_cancelled() => debug!("Session task aborted"),
        Err(e) => error!("Session task failed: {}", e),
    }
}
