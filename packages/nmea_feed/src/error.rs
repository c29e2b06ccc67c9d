/// Errors that can occur while fetching a sentence from upstream
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request could not be built or sent
    #[error("failed to fetch data: {0}")]
    Request(#[source] reqwest::Error),

    /// Upstream answered with something other than 200 OK
    #[error("failed to fetch data: HTTP {0}")]
    Status(u16),

    /// Response body could not be read
    #[error("failed to read response: {0}")]
    Body(#[source] reqwest::Error),

    /// Upstream answered 200 OK with nothing in it
    #[error("upstream returned an empty sentence")]
    EmptyBody,
}

impl FetchError {
    /// HTTP status code, if the failure was a non-200 response
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(code) => Some(*code),
            _ => None,
        }
    }
}
