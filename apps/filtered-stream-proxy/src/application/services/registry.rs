//! Session Registry
//!
//! Owns every live session, keyed by token. Structural changes (insert,
//! remove, sweep, reap) take one async lock so they never interleave.
//!
//! # Idle eviction
//!
//! Each sweep clears every session's keep-alive flag; a session whose flag
//! is already clear is evicted. A session therefore survives one silent
//! interval and is dropped after the second, so a ping at `t` keeps it
//! alive until at least `t + interval`.
//!
//! # Fatal terminations
//!
//! Sessions whose stream ends on its own (connection limit, rejection,
//! exhausted retries) send a `Termination`. The maintenance task removes
//! them, matching on `SessionId` so a stale notice never removes a newer
//! session for the same token.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session::{AuthError, Session, SessionConfig, SessionDeps, Termination};
use crate::application::ports::{RuleSyncPort, StreamConnector};
use crate::domain::session::Token;
use crate::infrastructure::metrics::{self, RemovalCause};

/// Registry settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Settings for new sessions.
    pub session: SessionConfig,
    /// Idle sweep interval.
    pub sweep_interval: Duration,
}

/// Session counts for health reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    /// Sessions in the registry.
    pub sessions: usize,
    /// Sessions per connection state.
    pub by_state: BTreeMap<&'static str, usize>,
}

/// Owner of all live sessions.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Token, Arc<Session>>>,
    deps: SessionDeps,
    config: RegistryConfig,
    terminations: Mutex<mpsc::UnboundedReceiver<Termination>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(
        rule_sync: Arc<dyn RuleSyncPort>,
        connector: Arc<dyn StreamConnector>,
        config: RegistryConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sessions: Mutex::new(HashMap::new()),
            deps: SessionDeps {
                rule_sync,
                connector,
                terminations: tx,
            },
            config,
            terminations: Mutex::new(rx),
        }
    }

    /// Look up the session for `token`.
    pub async fn find(&self, token: &Token) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(token).cloned()
    }

    /// Return the session for `token`, authenticating and starting one if
    /// none exists. The flag is `true` when a new session was created.
    ///
    /// Authentication runs without holding the registry lock.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if a new session was needed and the token was
    /// rejected.
    pub async fn find_or_create(&self, token: Token) -> Result<(Arc<Session>, bool), AuthError> {
        if let Some(existing) = self.find(&token).await {
            return Ok((existing, false));
        }

        let rules = Session::authenticate(&token, self.deps.rule_sync.as_ref()).await?;

        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&token) {
            return Ok((Arc::clone(existing), false));
        }

        let session = Session::start(token.clone(), rules, &self.deps, &self.config.session);
        sessions.insert(token, Arc::clone(&session));
        metrics::set_active_sessions(sessions.len());
        drop(sessions);

        Ok((session, true))
    }

    /// Destroy and remove the session for `token`. Returns whether one existed.
    pub async fn remove(&self, token: &Token) -> bool {
        self.remove_with_cause(token, RemovalCause::Logout).await
    }

    async fn remove_with_cause(&self, token: &Token, cause: RemovalCause) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(token).cloned() else {
            return false;
        };

        session.destroy().await;
        sessions.remove(token);
        metrics::set_active_sessions(sessions.len());
        drop(sessions);

        metrics::record_session_removed(cause);
        tracing::info!(session = %session.id(), cause = cause.as_str(), "Session removed");
        true
    }

    /// Run one idle sweep. Returns the number of sessions evicted.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;

        let idle: Vec<Token> = sessions
            .iter()
            .filter(|(_, session)| !session.take_keep_alive())
            .map(|(token, _)| token.clone())
            .collect();

        for token in &idle {
            if let Some(session) = sessions.remove(token) {
                session.destroy().await;
                metrics::record_session_removed(RemovalCause::Idle);
                tracing::info!(session = %session.id(), "Evicted idle session");
            }
        }

        metrics::set_active_sessions(sessions.len());
        tracing::debug!(evicted = idle.len(), remaining = sessions.len(), "Sweep complete");
        idle.len()
    }

    /// Remove the session a termination notice refers to, if it is still
    /// the registered one. Returns whether a session was removed.
    pub async fn reap(&self, termination: &Termination) -> bool {
        let mut sessions = self.sessions.lock().await;
        let current = sessions
            .get(&termination.token)
            .filter(|session| session.id() == termination.session_id)
            .cloned();

        let Some(session) = current else {
            tracing::debug!(session = %termination.session_id, "Stale termination notice");
            return false;
        };

        session.destroy().await;
        sessions.remove(&termination.token);
        metrics::set_active_sessions(sessions.len());
        drop(sessions);

        metrics::record_session_removed(RemovalCause::Fatal);
        tracing::warn!(
            session = %termination.session_id,
            reason = termination.exit.reason(),
            "Session torn down after fatal stream condition"
        );
        true
    }

    /// Sweep on the configured interval and reap fatal terminations until
    /// `cancel` fires, then destroy every remaining session.
    pub async fn run_maintenance(&self, cancel: CancellationToken) {
        let period = self.config.sweep_interval;
        let mut sweep = tokio::time::interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut terminations = self.terminations.lock().await;

        tracing::info!(interval_secs = period.as_secs(), "Session maintenance started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(termination) = terminations.recv() => {
                    self.reap(&termination).await;
                }
                _ = sweep.tick() => {
                    self.sweep().await;
                }
            }
        }

        drop(terminations);
        self.shutdown().await;
    }

    /// Destroy every session.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();

        for (_, session) in sessions.drain() {
            session.destroy().await;
            metrics::record_session_removed(RemovalCause::Shutdown);
        }

        metrics::set_active_sessions(0);
        tracing::info!(sessions = count, "All sessions destroyed");
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Session counts by connection state.
    pub async fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.lock().await;
        let mut by_state = BTreeMap::new();
        for session in sessions.values() {
            *by_state.entry(session.state().as_str()).or_insert(0) += 1;
        }

        RegistryStats {
            sessions: sessions.len(),
            by_state,
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use futures_util::stream;

    use super::*;
    use crate::application::ports::{FrameStream, MockRuleSyncPort, StreamError, UpstreamError};
    use crate::domain::rules::RuleSet;
    use crate::infrastructure::upstream::StreamClientConfig;

    struct IdleConnector;

    #[async_trait]
    impl StreamConnector for IdleConnector {
        async fn connect(&self, _token: &Token) -> Result<FrameStream, StreamError> {
            Ok(stream::pending().boxed())
        }
    }

    fn registry(rule_sync: MockRuleSyncPort) -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(rule_sync),
            Arc::new(IdleConnector),
            RegistryConfig {
                session: SessionConfig {
                    buffer_capacity: NonZeroUsize::new(5).unwrap(),
                    stream: StreamClientConfig::default(),
                },
                sweep_interval: Duration::from_secs(10),
            },
        )
    }

    fn accepting() -> MockRuleSyncPort {
        let mut rule_sync = MockRuleSyncPort::new();
        rule_sync
            .expect_get_rules()
            .returning(|_| Ok(RuleSet::empty()));
        rule_sync
    }

    fn token(value: &str) -> Token {
        Token::new(value).unwrap()
    }

    #[tokio::test]
    async fn find_or_create_reuses_session() {
        let registry = registry(accepting());

        let (first, created) = registry.find_or_create(token("alpha")).await.unwrap();
        assert!(created);
        let (second, created) = registry.find_or_create(token("alpha")).await.unwrap();
        assert!(!created);

        assert_eq!(first.id(), second.id());
        assert_eq!(registry.len().await, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_token_creates_nothing() {
        let mut rule_sync = MockRuleSyncPort::new();
        rule_sync
            .expect_get_rules()
            .returning(|_| Err(UpstreamError::Transport("refused".to_string())));
        let registry = registry(rule_sync);

        assert!(registry.find_or_create(token("alpha")).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_destroys_session() {
        let registry = registry(accepting());
        let (session, _) = registry.find_or_create(token("alpha")).await.unwrap();

        assert!(registry.remove(&token("alpha")).await);
        assert!(!registry.remove(&token("alpha")).await);
        assert!(session.state().is_terminated());
        assert!(registry.find(&token("alpha")).await.is_none());
    }

    #[tokio::test]
    async fn sweep_evicts_after_two_silent_rounds() {
        let registry = registry(accepting());
        registry.find_or_create(token("alpha")).await.unwrap();
        registry.find_or_create(token("beta")).await.unwrap();

        assert_eq!(registry.sweep().await, 0);

        registry
            .find(&token("beta"))
            .await
            .unwrap()
            .mark_alive();

        assert_eq!(registry.sweep().await, 1);
        assert!(registry.find(&token("alpha")).await.is_none());
        assert!(registry.find(&token("beta")).await.is_some());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn stale_termination_is_ignored() {
        let registry = registry(accepting());
        let (old, _) = registry.find_or_create(token("alpha")).await.unwrap();
        let old_id = old.id();
        registry.remove(&token("alpha")).await;
        let (new, _) = registry.find_or_create(token("alpha")).await.unwrap();

        let notice = Termination {
            token: token("alpha"),
            session_id: old_id,
            exit: crate::infrastructure::upstream::StreamExit::Fatal(StreamError::ConnectionLimit),
        };
        assert!(!registry.reap(&notice).await);
        assert_eq!(registry.find(&token("alpha")).await.unwrap().id(), new.id());

        let notice = Termination {
            session_id: new.id(),
            ..notice
        };
        assert!(registry.reap(&notice).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn stats_count_by_state() {
        let registry = registry(accepting());
        registry.find_or_create(token("alpha")).await.unwrap();

        let stats = registry.stats().await;
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.by_state.values().sum::<usize>(), 1);
        registry.shutdown().await;
    }
}
