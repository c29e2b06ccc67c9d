//! Per-connection push session.
//!
//! A session pushes the cached sentence as soon as the client connects and
//! then on its own timer. Alongside the pusher, a monitor task blocks on a
//! one-byte read: clients never send anything, so any byte, EOF or read error
//! means the peer is gone. Both sides share one `CancellationToken`; whichever
//! notices trouble first cancels it and the session closes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nmea_feed::{CachedSentence, SentenceCache};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Line terminator appended to every push
pub const LINE_ENDING: &str = "\r\n";

/// Timing knobs for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time between pushes after the initial one
    pub push_interval: Duration,
    /// Upper bound on a single write to the client
    pub write_timeout: Duration,
    /// TCP keep-alive probe period
    pub keepalive: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            keepalive: Duration::from_secs(30),
        }
    }
}

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Active,
    Closed,
}

/// Why a session closed
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no sentence cached yet")]
    NoData,

    #[error("error sending data: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimedOut(Duration),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("peer sent unexpected data")]
    UnexpectedData,

    #[error("error reading from peer: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("session cancelled")]
    Cancelled,
}

/// Summary of a finished session
#[derive(Debug)]
pub struct SessionOutcome {
    pub peer: String,
    /// Furthest state reached before closing; `Init` means the initial push never landed
    pub reached: SessionState,
    /// Lines successfully written, including the initial push
    pub pushes: u64,
    pub reason: SessionError,
}

/// Format a cached sentence as it goes on the wire
pub fn wire_line(sentence: &CachedSentence) -> String {
    format!("{}{}", sentence.text, LINE_ENDING)
}

pub struct Session {
    peer: String,
    cache: Arc<SentenceCache>,
    config: SessionConfig,
    cancel: CancellationToken,
    state: SessionState,
    pushes: u64,
}

impl Session {
    pub fn new(peer: impl Into<String>, cache: Arc<SentenceCache>, config: SessionConfig) -> Self {
        Self {
            peer: peer.into(),
            cache,
            config,
            cancel: CancellationToken::new(),
            state: SessionState::Init,
            pushes: 0,
        }
    }

    /// Token that ends this session when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to completion over the given halves of a connection.
    ///
    /// The reader is handed to the monitor task; the writer stays with the pusher.
    pub async fn run<R, W>(mut self, reader: R, mut writer: W) -> SessionOutcome
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        if let Err(reason) = self.push(&mut writer).await {
            drop(reader);
            return self.close(writer, reason).await;
        }

        self.state = SessionState::Active;
        debug!(peer = %self.peer, "Session active");

        let monitor = tokio::spawn(monitor_peer(reader, self.cancel.clone()));
        let push_error = self.push_loop(&mut writer).await;

        let peer_error = match monitor.await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(peer = %self.peer, "Connection monitor task failed: {}", e);
                None
            }
        };

        let reason = push_error
            .or(peer_error)
            .unwrap_or(SessionError::Cancelled);
        self.close(writer, reason).await
    }

    /// Push on every tick until a write fails or the token is cancelled
    async fn push_loop<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Option<SessionError> {
        let period = self.config.push_interval;
        // A period too large to schedule never ticks
        let Some(first_tick) = Instant::now().checked_add(period) else {
            self.cancel.cancelled().await;
            return None;
        };
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                _ = ticker.tick() => {
                    if let Err(e) = self.push(writer).await {
                        self.cancel.cancel();
                        return Some(e);
                    }
                }
            }
        }
    }

    /// Send the current snapshot, bounded by the write timeout
    async fn push<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<(), SessionError> {
        let snapshot = self.cache.get().await;
        if snapshot.is_empty() {
            return Err(SessionError::NoData);
        }

        debug!(peer = %self.peer, "Sending: {}", snapshot.text);

        let line = wire_line(&snapshot);
        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SessionError::WriteFailed(e)),
            Err(_) => return Err(SessionError::WriteTimedOut(self.config.write_timeout)),
        }

        self.pushes += 1;
        Ok(())
    }

    async fn close<W: AsyncWrite + Unpin>(
        mut self,
        mut writer: W,
        reason: SessionError,
    ) -> SessionOutcome {
        self.cancel.cancel();
        let reached = std::mem::replace(&mut self.state, SessionState::Closed);

        // Best effort FIN; a stalled peer mustn't hold the close open
        let _ = tokio::time::timeout(self.config.write_timeout, writer.shutdown()).await;
        drop(writer);

        match &reason {
            SessionError::NoData => {
                warn!(peer = %self.peer, "Error sending initial message: {}", reason)
            }
            SessionError::WriteFailed(_) | SessionError::WriteTimedOut(_) => {
                warn!(peer = %self.peer, "Error in push loop: {}", reason)
            }
            _ => debug!(peer = %self.peer, "Connection monitor: {}", reason),
        }
        info!(peer = %self.peer, pushes = self.pushes, "Connection closed");

        SessionOutcome {
            peer: self.peer,
            reached,
            pushes: self.pushes,
            reason,
        }
    }
}

/// Block on a read until the peer does anything at all, then cancel.
///
/// Returns `None` if the session was cancelled from the pusher side first.
async fn monitor_peer<R: AsyncRead + Unpin>(
    mut reader: R,
    cancel: CancellationToken,
) -> Option<SessionError> {
    let mut buf = [0u8; 1];
    let reason = tokio::select! {
        _ = cancel.cancelled() => return None,
        read = reader.read(&mut buf) => match read {
            Ok(0) => SessionError::PeerClosed,
            Ok(_) => SessionError::UnexpectedData,
            Err(e) => SessionError::ReadFailed(e),
        },
    };
    cancel.cancel();
    Some(reason)
}

/// Enable keep-alive probing on an accepted connection
pub fn configure_keepalive(stream: &TcpStream, period: Duration) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(period);
    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
    let keepalive = keepalive.with_interval(period);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

/// Run a session over an accepted TCP connection
pub async fn serve_tcp(
    stream: TcpStream,
    peer: SocketAddr,
    cache: Arc<SentenceCache>,
    config: SessionConfig,
) -> SessionOutcome {
    if let Err(e) = configure_keepalive(&stream, config.keepalive) {
        warn!(peer = %peer, error = %e, "Failed to enable TCP keep-alive");
    }

    let (reader, writer) = stream.into_split();
    Session::new(peer.to_string(), cache, config)
        .run(reader, writer)
        .await
}
