//! Session
//!
//! One authenticated user: token, rule set, item buffer, and the stream
//! task that fills it. A session is created by authenticating the token
//! against the rules endpoint and is destroyed on logout, idle eviction,
//! or a fatal stream condition.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{RuleSyncPort, StreamConnector, UpstreamError};
use crate::domain::buffer::RingBuffer;
use crate::domain::rules::{Rule, RuleSet};
use crate::domain::session::{SessionId, Token};
use crate::domain::streaming::{ConnectionState, StreamItem};
use crate::infrastructure::metrics;
use crate::infrastructure::upstream::{StreamClient, StreamClientConfig, StreamExit};

// =============================================================================
// Errors
// =============================================================================

/// The token could not be verified with the upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(#[from] pub UpstreamError);

/// A step of rule replacement failed.
///
/// Replacement is fetch, delete, add against an external system with no
/// transaction. The variant says how far it got.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleSyncError {
    /// Fetching the current rules failed. Nothing changed upstream.
    #[error("fetching current rules failed: {0}")]
    Fetch(#[source] UpstreamError),

    /// Deleting the current rules failed. Upstream state is unknown.
    #[error("deleting current rules failed: {0}")]
    Delete(#[source] UpstreamError),

    /// Adding the new rules failed. There were no previous rules, so
    /// nothing was lost.
    #[error("adding rules failed: {0}")]
    Add(#[source] UpstreamError),

    /// Deletion went through but adding the new rules failed. The upstream
    /// now holds no rules at all.
    #[error("adding rules failed after previous rules were deleted: {0}")]
    PartialReplace(#[source] UpstreamError),
}

impl RuleSyncError {
    /// Step label for logs and metrics.
    #[must_use]
    pub const fn step(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Delete(_) => "delete",
            Self::Add(_) | Self::PartialReplace(_) => "add",
        }
    }

    /// Whether the failure left previously active rules deleted.
    #[must_use]
    pub const fn rules_cleared(&self) -> bool {
        matches!(self, Self::PartialReplace(_))
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings applied to every new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Items retained per session.
    pub buffer_capacity: NonZeroUsize,
    /// Stream client behavior.
    pub stream: StreamClientConfig,
}

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct SessionDeps {
    /// Rules endpoint.
    pub rule_sync: Arc<dyn RuleSyncPort>,
    /// Stream endpoint.
    pub connector: Arc<dyn StreamConnector>,
    /// Receives a notice when a session's stream ends on its own.
    pub terminations: mpsc::UnboundedSender<Termination>,
}

/// A session's stream task stopped without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Token of the session.
    pub token: Token,
    /// Which session instance stopped.
    pub session_id: SessionId,
    /// Why the stream ended.
    pub exit: StreamExit,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Session instance id.
    pub session_id: String,
    /// Upstream connection state.
    pub state: ConnectionState,
    /// Consecutive reconnect attempts since the last data frame.
    pub retry_count: u32,
    /// Items currently buffered.
    pub buffered: usize,
    /// Buffer capacity.
    pub capacity: usize,
    /// Rules currently known to be active.
    pub rules: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Session
// =============================================================================

/// A live per-user streaming session.
pub struct Session {
    id: SessionId,
    token: Token,
    created_at: DateTime<Utc>,
    rule_sync: Arc<dyn RuleSyncPort>,
    rules: RwLock<RuleSet>,
    rule_updates: tokio::sync::Mutex<()>,
    buffer: Arc<RingBuffer<StreamItem>>,
    client: Arc<StreamClient>,
    keep_alive: AtomicBool,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Authenticate `token` and start a session for it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the upstream rejects the token or cannot be
    /// reached. No stream is opened in that case.
    pub async fn create(
        token: Token,
        deps: &SessionDeps,
        config: &SessionConfig,
    ) -> Result<Arc<Self>, AuthError> {
        let rules = Self::authenticate(&token, deps.rule_sync.as_ref()).await?;
        Ok(Self::start(token, rules, deps, config))
    }

    /// Check `token` by fetching its rules.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` on any upstream failure.
    pub async fn authenticate(
        token: &Token,
        rule_sync: &dyn RuleSyncPort,
    ) -> Result<RuleSet, AuthError> {
        rule_sync.get_rules(token).await.map_err(|e| {
            tracing::warn!(token = %token, error = %e, "Token rejected");
            AuthError(e)
        })
    }

    /// Start a session for an already authenticated token.
    ///
    /// Spawns the stream task; must be called within a Tokio runtime.
    #[must_use]
    pub fn start(
        token: Token,
        rules: RuleSet,
        deps: &SessionDeps,
        config: &SessionConfig,
    ) -> Arc<Self> {
        let id = SessionId::generate();
        let buffer = Arc::new(RingBuffer::with_capacity(config.buffer_capacity));
        let client = Arc::new(StreamClient::new(
            id,
            token.clone(),
            Arc::clone(&deps.connector),
            Arc::clone(&buffer),
            config.stream.clone(),
            CancellationToken::new(),
        ));

        let task = {
            let client = Arc::clone(&client);
            let token = token.clone();
            let terminations = deps.terminations.clone();
            tokio::spawn(async move {
                let exit = client.run().await;
                if exit.is_fatal() {
                    // Receiver gone means the registry is shutting down.
                    let _ = terminations.send(Termination {
                        token,
                        session_id: id,
                        exit,
                    });
                }
            })
        };

        tracing::info!(session = %id, token = %token, rules = rules.len(), "Session started");

        Arc::new(Self {
            id,
            token,
            created_at: Utc::now(),
            rule_sync: Arc::clone(&deps.rule_sync),
            rules: RwLock::new(rules),
            rule_updates: tokio::sync::Mutex::new(()),
            buffer,
            client,
            keep_alive: AtomicBool::new(true),
            task: tokio::sync::Mutex::new(Some(task)),
        })
    }

    /// Session instance id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Token this session belongs to.
    #[must_use]
    pub const fn token(&self) -> &Token {
        &self.token
    }

    /// Rules currently known to be active upstream.
    #[must_use]
    pub fn rules(&self) -> RuleSet {
        self.rules.read().clone()
    }

    /// Upstream connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Replace every upstream rule with `new_rules`.
    ///
    /// Fetches the current rules, deletes them, then adds the new ones.
    /// An empty `new_rules` leaves the upstream with no rules. Concurrent
    /// calls on one session run one after another.
    ///
    /// # Errors
    ///
    /// Returns `RuleSyncError` naming the step that failed. On
    /// `PartialReplace` the upstream holds no rules.
    pub async fn replace_rules(&self, new_rules: Vec<Rule>) -> Result<(), RuleSyncError> {
        let _serial = self.rule_updates.lock().await;

        let deleted = self.delete_current_rules().await?;

        if new_rules.is_empty() {
            *self.rules.write() = RuleSet::empty();
            tracing::info!(session = %self.id, deleted, "Rules cleared");
            return Ok(());
        }

        match self.rule_sync.add_rules(&self.token, &new_rules).await {
            Ok(stored) => {
                let stored = if stored.is_empty() {
                    RuleSet::from_rules(new_rules)
                } else {
                    stored
                };
                tracing::info!(session = %self.id, deleted, added = stored.len(), "Rules replaced");
                *self.rules.write() = stored;
                Ok(())
            }
            Err(source) => {
                *self.rules.write() = RuleSet::empty();
                let err = if deleted > 0 {
                    RuleSyncError::PartialReplace(source)
                } else {
                    RuleSyncError::Add(source)
                };
                self.record_rule_failure(&err);
                Err(err)
            }
        }
    }

    /// Delete every upstream rule without adding any.
    ///
    /// # Errors
    ///
    /// Returns `RuleSyncError::Fetch` or `RuleSyncError::Delete`.
    pub async fn clear_rules(&self) -> Result<(), RuleSyncError> {
        self.replace_rules(Vec::new()).await
    }

    /// Fetch and delete the current upstream rules; returns how many were deleted.
    async fn delete_current_rules(&self) -> Result<usize, RuleSyncError> {
        let current = match self.rule_sync.get_rules(&self.token).await {
            Ok(current) => current,
            Err(e) => {
                let err = RuleSyncError::Fetch(e);
                self.record_rule_failure(&err);
                return Err(err);
            }
        };

        let ids = current.ids();
        *self.rules.write() = current;

        if ids.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.rule_sync.delete_rules(&self.token, &ids).await {
            let err = RuleSyncError::Delete(e);
            self.record_rule_failure(&err);
            return Err(err);
        }

        Ok(ids.len())
    }

    fn record_rule_failure(&self, err: &RuleSyncError) {
        metrics::record_rule_sync_failure(err.step());
        tracing::warn!(session = %self.id, step = err.step(), error = %err, "Rule sync failed");
    }

    /// Record a liveness ping from the caller.
    pub fn mark_alive(&self) {
        self.keep_alive.store(true, Ordering::SeqCst);
    }

    /// Clear the keep-alive flag, returning whether it was set.
    ///
    /// A single atomic swap, so a ping racing the sweep is never lost.
    pub fn take_keep_alive(&self) -> bool {
        self.keep_alive.swap(false, Ordering::SeqCst)
    }

    /// Buffered items, oldest first. Does not clear the buffer.
    #[must_use]
    pub fn drain(&self) -> Vec<StreamItem> {
        self.buffer.snapshot()
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.to_string(),
            state: self.client.state(),
            retry_count: self.client.retry_count(),
            buffered: self.buffer.len(),
            capacity: self.buffer.capacity(),
            rules: self.rules.read().len(),
            created_at: self.created_at,
        }
    }

    /// Stop the stream task and release buffered items. Idempotent.
    ///
    /// Returns once the stream task has exited and its connection is closed,
    /// including for callers racing an in-progress destroy.
    pub async fn destroy(&self) {
        self.client.stop();

        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };

        if let Err(e) = handle.await {
            tracing::error!(session = %self.id, error = %e, "Stream task failed");
        }

        self.buffer.clear();
        drop(task);
        tracing::info!(session = %self.id, "Session destroyed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("token", &self.token)
            .field("state", &self.client.state())
            .finish_non_exhaustive()
    }
}
