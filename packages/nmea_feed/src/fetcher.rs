use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::error::FetchError;

/// Anything that can produce the current sentence for a boat.
///
/// The HTTP implementation is [`HttpFetcher`]; tests plug in scripted sources.
pub trait SentenceSource: Send + Sync + 'static {
    fn fetch_sentence(
        &self,
        boat_id: &str,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Fetches sentences from the Globe API over HTTP
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher for the given API host.
    ///
    /// `request_timeout` of `None` leaves reqwest's default in place, which
    /// means a stalled upstream can hold a fetch open indefinitely.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Request)?;

        let base_url: String = base_url.into();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Full URL of the sentence endpoint for a boat
    pub fn sentence_url(&self, boat_id: &str) -> String {
        format!("{}/api/v2/globe/boats/{}/nmea0183", self.base_url, boat_id)
    }
}

impl SentenceSource for HttpFetcher {
    async fn fetch_sentence(&self, boat_id: &str) -> Result<String, FetchError> {
        let url = self.sentence_url(boat_id);
        debug!("Fetching sentence from {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FetchError::Request)?;

        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let body = resp.text().await.map_err(FetchError::Body)?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(body)
    }
}
