//! NMEA Feed - upstream polling and caching for a single boat
//!
//! This crate fetches a boat's current NMEA 0183 sentence from the Globe API,
//! keeps the most recent one in a shared cache and refreshes it on a fixed
//! interval. It has no socket or client knowledge; consumers read snapshots
//! from the cache.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use nmea_feed::{HttpFetcher, Refresher, SentenceCache};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fetcher = HttpFetcher::new("https://api.marineverse.com", None).unwrap();
//!     let cache = Arc::new(SentenceCache::new());
//!     let refresher = Arc::new(Refresher::new(fetcher, "abc-123", cache.clone()));
//!
//!     let _task = refresher.spawn(Duration::from_secs(600));
//!
//!     tokio::time::sleep(Duration::from_secs(1)).await;
//!     let snapshot = cache.get().await;
//!     println!("latest: {:?} at {:?}", snapshot.text, snapshot.fetched_at);
//! }
//! ```

mod cache;
mod error;
mod fetcher;
mod refresh;

pub use cache::{CachedSentence, SentenceCache};
pub use error::FetchError;
pub use fetcher::{HttpFetcher, SentenceSource};
pub use refresh::{RefreshOutcome, RefreshStats, Refresher};
