//! Relay metrics for observability

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use nmea_feed::RefreshStats;

use crate::session::{SessionError, SessionOutcome, SessionState};

/// Process-wide counters
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Sessions currently open
    pub active_sessions: AtomicU64,
    /// Sessions accepted since start
    pub total_sessions: AtomicU64,
    /// Sessions closed before the initial push landed
    pub sessions_rejected: AtomicU64,
    /// Lines written to clients
    pub pushes_sent: AtomicU64,
    /// Sessions ended by a failed or timed out write
    pub push_failures: AtomicU64,
    /// Failed accept() calls
    pub accept_errors: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self, outcome: &SessionOutcome) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.pushes_sent.fetch_add(outcome.pushes, Ordering::Relaxed);
        if outcome.reached == SessionState::Init {
            self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if matches!(
            outcome.reason,
            SessionError::WriteFailed(_) | SessionError::WriteTimedOut(_)
        ) {
            self.push_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self, refresh: &RefreshStats) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            sessions: SessionMetrics {
                active: self.active_sessions.load(Ordering::Relaxed),
                total: self.total_sessions.load(Ordering::Relaxed),
                rejected: self.sessions_rejected.load(Ordering::Relaxed),
            },
            pushes: PushMetrics {
                sent: self.pushes_sent.load(Ordering::Relaxed),
                failures: self.push_failures.load(Ordering::Relaxed),
            },
            fetches: FetchMetrics {
                successes: refresh.successes(),
                failures: refresh.failures(),
            },
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub sessions: SessionMetrics,
    pub pushes: PushMetrics,
    pub fetches: FetchMetrics,
    pub accept_errors: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub active: u64,
    pub total: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMetrics {
    pub sent: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMetrics {
    pub successes: u64,
    pub failures: u64,
}
