//! Globe NMEA server - relays a boat's NMEA 0183 sentence to TCP clients
//!
//! A background refresh loop polls the Globe API into a shared cache; every
//! connected client gets the cached sentence on connect and then every few
//! seconds on its own timer.

pub mod config;
pub mod metrics;
pub mod server;
pub mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use nmea_feed::{HttpFetcher, Refresher, SentenceCache};
use tracing::{info, warn};

pub use config::{CliOverrides, Config, ConfigError};
pub use server::{AcceptErrorPolicy, Server};
pub use session::{Session, SessionConfig, SessionError, SessionOutcome, SessionState};

/// Bind, start the refresh loop and serve clients until the process is stopped.
///
/// Only returns early if startup fails; open sessions are not drained on exit.
pub async fn run(config: Config) -> Result<()> {
    if config.request_timeout.is_none() {
        warn!("No upstream request timeout configured; a stalled upstream can block refreshes");
    }

    let fetcher = HttpFetcher::new(config.host.clone(), config.request_timeout)
        .context("failed to build HTTP client")?;
    let cache = Arc::new(SentenceCache::new());
    let refresher = Arc::new(Refresher::new(fetcher, config.boat_id.clone(), cache));

    let server = Server::bind(
        config.listen_addr,
        refresher.clone(),
        config.session,
        config.accept_policy,
    )
    .await?;

    info!(
        boat = %config.boat_id,
        host = %config.host,
        "Relaying NMEA sentences"
    );

    let refresh_task = refresher.spawn(config.refresh_interval);
    server.run().await;
    refresh_task.abort();
    Ok(())
}
