//! Stream Client
//!
//! Owns the upstream stream connection of one session. The read loop
//! classifies every frame, appends items to the session buffer, and drives
//! the reconnect state machine:
//!
//! ```text
//! Connecting ─► Streaming ─(reset)─► Backoff ─(delay)─► Connecting
//!      any state ─(stop | connection limit | rejected)─► Terminated
//! ```
//!
//! Every suspension point (connect, next frame, backoff delay) races the
//! cancellation token, so `stop` interrupts the loop promptly and drops the
//! live connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::codec::{Frame, FrameCodec};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{FrameStream, StreamConnector, StreamError};
use crate::domain::buffer::RingBuffer;
use crate::domain::session::{SessionId, Token};
use crate::domain::streaming::{ConnectionState, StreamItem};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// Reconnection backoff.
    pub reconnect: ReconnectConfig,
    /// Treat a connection that delivers no frame for this long as reset.
    pub stall_timeout: Option<Duration>,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            stall_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl StreamClientConfig {
    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            reconnect: ReconnectConfig::from_stream_settings(settings),
            stall_timeout: settings.stall_timeout,
        }
    }
}

// =============================================================================
// Exit reasons
// =============================================================================

/// Why the read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    /// Explicit stop request.
    Stopped,
    /// Non-retryable upstream condition.
    Fatal(StreamError),
    /// Consecutive transient failures hit the configured attempt limit.
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

impl StreamExit {
    /// Whether the owning session must be torn down.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Short reason label for logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Fatal(StreamError::ConnectionLimit) => "connection_limit",
            Self::Fatal(StreamError::Rejected(_)) => "rejected",
            Self::Fatal(StreamError::Reset(_)) => "reset",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Upstream stream client for one session.
pub struct StreamClient {
    session_id: SessionId,
    token: Token,
    connector: Arc<dyn StreamConnector>,
    buffer: Arc<RingBuffer<StreamItem>>,
    codec: FrameCodec,
    config: StreamClientConfig,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    retry_count: AtomicU32,
}

impl StreamClient {
    /// Create a new stream client. Nothing connects until `run` is polled.
    #[must_use]
    pub fn new(
        session_id: SessionId,
        token: Token,
        connector: Arc<dyn StreamConnector>,
        buffer: Arc<RingBuffer<StreamItem>>,
        config: StreamClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            session_id,
            token,
            connector,
            buffer,
            codec: FrameCodec::new(),
            config,
            cancel,
            state,
            retry_count: AtomicU32::new(0),
        }
    }

    /// Run the connection loop until stopped or a fatal condition occurs.
    pub async fn run(&self) -> StreamExit {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        let exit = loop {
            if self.cancel.is_cancelled() {
                break StreamExit::Stopped;
            }

            self.set_state(ConnectionState::Connecting);

            let error = match self.connect_and_stream(&mut policy).await {
                Ok(()) => break StreamExit::Stopped,
                Err(e) => e,
            };

            if !error.is_transient() {
                tracing::error!(
                    session = %self.session_id,
                    error = %error,
                    "Fatal stream condition, terminating"
                );
                break StreamExit::Fatal(error);
            }

            let Some(delay) = policy.next_delay() else {
                tracing::error!(
                    session = %self.session_id,
                    attempts = policy.retry_count(),
                    "Reconnect attempts exhausted"
                );
                break StreamExit::RetriesExhausted {
                    attempts: policy.retry_count(),
                };
            };

            self.retry_count
                .store(policy.retry_count(), Ordering::SeqCst);
            self.set_state(ConnectionState::Backoff);
            metrics::record_reconnect(delay);

            tracing::warn!(
                session = %self.session_id,
                error = %error,
                attempt = policy.retry_count(),
                delay_ms = delay.as_millis(),
                "Stream disconnected, backing off"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break StreamExit::Stopped,
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.set_state(ConnectionState::Terminated);
        if exit.is_fatal() {
            metrics::record_stream_terminated(exit.reason());
        }
        tracing::info!(session = %self.session_id, reason = exit.reason(), "Stream client terminated");

        exit
    }

    /// Connect and read frames until cancelled (`Ok`) or disconnected (`Err`).
    async fn connect_and_stream(&self, policy: &mut ReconnectPolicy) -> Result<(), StreamError> {
        tracing::debug!(session = %self.session_id, "Connecting to stream");

        let mut frames = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            result = self.connector.connect(&self.token) => result?,
        };

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                next = self.next_frame(&mut frames) => next?,
            };

            let Some(frame) = next else {
                return Err(StreamError::Reset("stream closed by peer".to_string()));
            };

            match self.codec.classify(&frame) {
                Frame::Data(item) => {
                    self.set_state(ConnectionState::Streaming);
                    if self.buffer.add(item).is_some() {
                        metrics::record_item_dropped();
                    }
                    metrics::record_item_received();

                    policy.reset();
                    self.retry_count.store(0, Ordering::SeqCst);
                }
                Frame::KeepAlive => {
                    self.set_state(ConnectionState::Streaming);
                    metrics::record_keep_alive();
                    tracing::trace!(session = %self.session_id, "Keep-alive frame");
                }
                Frame::ConnectionLimit => return Err(StreamError::ConnectionLimit),
            }
        }
    }

    async fn next_frame(
        &self,
        frames: &mut FrameStream,
    ) -> Result<Option<String>, StreamError> {
        match self.config.stall_timeout {
            Some(limit) => tokio::time::timeout(limit, frames.next())
                .await
                .map_err(|_| StreamError::Reset(format!("no frame within {}s", limit.as_secs())))?
                .transpose(),
            None => frames.next().await.transpose(),
        }
    }

    /// Request termination. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Consecutive backoff cycles since the last data frame.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next || current.is_terminated() {
                return false;
            }
            tracing::debug!(
                session = %self.session_id,
                from = current.as_str(),
                to = next.as_str(),
                "Stream state change"
            );
            *current = next;
            true
        });
    }
}
