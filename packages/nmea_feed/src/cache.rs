use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// A copy of the cache contents at one point in time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachedSentence {
    /// Raw sentence as returned by upstream; empty until the first successful fetch
    pub text: String,
    /// When `text` was stored; `None` until the first successful fetch
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CachedSentence {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Single-slot cache of the latest sentence.
///
/// Readers always get an owned snapshot; the write lock is only held for the
/// swap itself.
#[derive(Debug, Default)]
pub struct SentenceCache {
    inner: RwLock<CachedSentence>,
}

impl SentenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current contents
    pub async fn get(&self) -> CachedSentence {
        self.inner.read().await.clone()
    }

    /// Whether nothing has been stored yet
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Store a freshly fetched sentence.
    ///
    /// Empty text is refused so a stored sentence is never replaced by nothing.
    /// Returns whether the cache was updated.
    pub async fn set(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        if text.is_empty() {
            return false;
        }

        let now = Utc::now();
        let mut slot = self.inner.write().await;
        // fetched_at never moves backwards, even if the wall clock does
        let fetched_at = match slot.fetched_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        slot.text = text;
        slot.fetched_at = Some(fetched_at);
        true
    }
}
