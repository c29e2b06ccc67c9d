use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cache::SentenceCache;
use crate::error::FetchError;
use crate::fetcher::SentenceSource;

/// Result of a single fetch-and-store attempt
#[derive(Debug)]
pub enum RefreshOutcome {
    /// Cache now holds the fetched sentence
    Updated { bytes: usize },
    /// Fetch failed; cache kept whatever it had
    Failed(FetchError),
}

/// Counters for fetch attempts, shared with whoever reports metrics
#[derive(Debug, Default)]
pub struct RefreshStats {
    pub successes: AtomicU64,
    pub failures: AtomicU64,
}

impl RefreshStats {
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Drives a [`SentenceSource`] into a [`SentenceCache`] for one boat.
///
/// Failures never clear the cache: clients are served a stale sentence
/// rather than nothing.
pub struct Refresher<S> {
    source: S,
    boat_id: String,
    cache: Arc<SentenceCache>,
    stats: RefreshStats,
}

impl<S: SentenceSource> Refresher<S> {
    pub fn new(source: S, boat_id: impl Into<String>, cache: Arc<SentenceCache>) -> Self {
        Self {
            source,
            boat_id: boat_id.into(),
            cache,
            stats: RefreshStats::default(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &Arc<SentenceCache> {
        &self.cache
    }

    pub fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Fetch once and store the result on success
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let outcome = match self.source.fetch_sentence(&self.boat_id).await {
            Ok(text) => {
                let bytes = text.len();
                if self.cache.set(text).await {
                    RefreshOutcome::Updated { bytes }
                } else {
                    RefreshOutcome::Failed(FetchError::EmptyBody)
                }
            }
            Err(e) => RefreshOutcome::Failed(e),
        };

        match &outcome {
            RefreshOutcome::Updated { bytes } => {
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                info!(boat = %self.boat_id, bytes, "Refreshed sentence cache");
            }
            RefreshOutcome::Failed(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    boat = %self.boat_id,
                    error = %e,
                    "Failed to refresh sentence, keeping cached value"
                );
            }
        }
        outcome
    }

    /// Spawn the background loop: one refresh immediately, then one per `every`.
    ///
    /// Runs until the returned handle is aborted or the runtime shuts down.
    ///
    /// # Panics
    ///
    /// Panics if `every` is zero.
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        assert!(!every.is_zero(), "refresh interval must be non-zero");

        tokio::spawn(async move {
            info!(
                boat = %self.boat_id,
                "Starting refresh loop with interval {:?}", every
            );

            // First tick completes immediately, giving the startup fetch
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.refresh_once().await;
            }
        })
    }
}
