//! Stream Gateway
//!
//! The inbound operations exposed to callers: login, logout, rule
//! replacement, keep-alive, polling, and status. Transport adapters call
//! these; nothing here knows about HTTP.

use std::sync::Arc;

use super::registry::SessionRegistry;
use super::session::{AuthError, RuleSyncError, Session, SessionStatus};
use crate::domain::rules::Rule;
use crate::domain::session::Token;
use crate::domain::streaming::StreamItem;

/// Errors surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Credential check failed; no session was created.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// No active session for the token.
    #[error("no active session for this token")]
    NotFound,

    /// Rule replacement failed part way.
    #[error(transparent)]
    RuleSync(#[from] RuleSyncError),
}

/// Caller-facing façade over the session registry.
#[derive(Debug, Clone)]
pub struct StreamGateway {
    registry: Arc<SessionRegistry>,
}

impl StreamGateway {
    /// Create a gateway over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session for `token`, or refresh the existing one.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Auth` if the token is rejected.
    pub async fn login(&self, token: Token) -> Result<(), GatewayError> {
        let (session, created) = self.registry.find_or_create(token).await?;
        if !created {
            session.mark_alive();
            tracing::debug!(session = %session.id(), "Re-login refreshed existing session");
        }
        Ok(())
    }

    /// End the session for `token`. Succeeds whether or not one exists.
    pub async fn logout(&self, token: &Token) {
        self.registry.remove(token).await;
    }

    /// Replace the upstream rules of the session.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` or `GatewayError::RuleSync`.
    pub async fn replace_rules(&self, token: &Token, rules: Vec<Rule>) -> Result<(), GatewayError> {
        let session = self.session(token).await?;
        session.replace_rules(rules).await?;
        Ok(())
    }

    /// Delete every upstream rule of the session.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` or `GatewayError::RuleSync`.
    pub async fn clear_rules(&self, token: &Token) -> Result<(), GatewayError> {
        let session = self.session(token).await?;
        session.clear_rules().await?;
        Ok(())
    }

    /// Record a liveness ping.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the session is gone.
    pub async fn keep_alive(&self, token: &Token) -> Result<(), GatewayError> {
        self.session(token).await?.mark_alive();
        Ok(())
    }

    /// Buffered items, oldest first.
    ///
    /// Polling does not count as a keep-alive.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the session is gone.
    pub async fn fetch_items(&self, token: &Token) -> Result<Vec<StreamItem>, GatewayError> {
        Ok(self.session(token).await?.drain())
    }

    /// Connection and buffer status of the session.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NotFound` if the session is gone.
    pub async fn session_status(&self, token: &Token) -> Result<SessionStatus, GatewayError> {
        Ok(self.session(token).await?.status())
    }

    async fn session(&self, token: &Token) -> Result<Arc<Session>, GatewayError> {
        self.registry
            .find(token)
            .await
            .ok_or(GatewayError::NotFound)
    }
}
