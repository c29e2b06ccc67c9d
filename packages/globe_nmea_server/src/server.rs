use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nmea_feed::{Refresher, SentenceSource};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::metrics::RelayMetrics;
use crate::session::{self, SessionConfig};

/// What the accept loop does after `accept()` fails.
///
/// The default pause is zero: retry immediately. A persistent failure
/// (e.g. fd exhaustion) will then spin, so deployments can set a pause.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcceptErrorPolicy {
    pub pause: Duration,
}

impl AcceptErrorPolicy {
    pub async fn after_error(&self) {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
    }
}

/// Accepts TCP clients and runs one session per connection
pub struct Server<S> {
    listener: TcpListener,
    refresher: Arc<Refresher<S>>,
    session_config: SessionConfig,
    accept_policy: AcceptErrorPolicy,
    metrics: Arc<RelayMetrics>,
}

impl<S: SentenceSource> Server<S> {
    /// Bind the listening socket. Failure here is fatal for the process.
    pub async fn bind(
        addr: SocketAddr,
        refresher: Arc<Refresher<S>>,
        session_config: SessionConfig,
        accept_policy: AcceptErrorPolicy,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to start server on {}", addr))?;

        Ok(Self {
            listener,
            refresher,
            session_config,
            accept_policy,
            metrics: Arc::new(RelayMetrics::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    /// Accept connections forever.
    ///
    /// Each accepted connection first triggers a best-effort cache refresh,
    /// then gets its own session task. Accept errors are logged and retried
    /// according to the [`AcceptErrorPolicy`].
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Server listening on {}...", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "Connected");
                    // Outcome is logged by the refresher; the session serves
                    // whatever is cached either way
                    self.refresher.refresh_once().await;
                    self.spawn_session(stream, peer);
                }
                Err(e) => {
                    warn!(error = %e, "Error accepting connection");
                    self.metrics.accept_error();
                    self.accept_policy.after_error().await;
                }
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        let cache = self.refresher.cache().clone();
        let config = self.session_config;
        let metrics = self.metrics.clone();
        let refresher = self.refresher.clone();

        metrics.session_opened();
        tokio::spawn(async move {
            let outcome = session::serve_tcp(stream, peer, cache, config).await;
            metrics.session_closed(&outcome);
            debug!(metrics = ?metrics.snapshot(refresher.stats()), "Session metrics");
        });
    }
}
