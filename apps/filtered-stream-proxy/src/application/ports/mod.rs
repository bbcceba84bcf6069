//! Port Interfaces
//!
//! Contracts for the external systems the session services depend on.
//! Infrastructure adapters implement them over HTTP; tests implement them
//! in memory.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RuleSyncPort`: get, delete, and add upstream filter rules
//! - `StreamConnector`: open a long-lived frame stream for a token

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::rules::{Rule, RuleId, RuleSet};
use crate::domain::session::Token;

// =============================================================================
// Rule Sync Port
// =============================================================================

/// Failure talking to the upstream rule-management endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream answered with an unexpected status.
    #[error("upstream returned status {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, surfaced as the error detail.
        detail: String,
    },

    /// The request never completed.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid upstream response: {0}")]
    Decode(String),
}

/// Request/response façade over the upstream rule-management endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleSyncPort: Send + Sync {
    /// Fetch the rules currently stored for `token`, with their ids.
    ///
    /// Also serves as the credential check at login.
    async fn get_rules(&self, token: &Token) -> Result<RuleSet, UpstreamError>;

    /// Delete the rules with the given ids.
    async fn delete_rules(&self, token: &Token, ids: &[RuleId]) -> Result<(), UpstreamError>;

    /// Add rules; returns them as stored, with their new ids.
    async fn add_rules(&self, token: &Token, rules: &[Rule]) -> Result<RuleSet, UpstreamError>;
}

// =============================================================================
// Stream Connector Port
// =============================================================================

/// Why a stream connection could not be opened or was lost.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Peer closed or the connection dropped. Retried with backoff.
    #[error("connection reset: {0}")]
    Reset(String),

    /// The account is already at its connection cap.
    #[error("connection limit exceeded")]
    ConnectionLimit,

    /// The upstream refused the stream for any other reason.
    #[error("stream rejected: {0}")]
    Rejected(String),
}

impl StreamError {
    /// Whether reconnecting may help.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Reset(_))
    }
}

/// Raw newline-delimited frames from an open stream connection.
///
/// The stream ending (`None`) means the peer closed the connection.
pub type FrameStream = BoxStream<'static, Result<String, StreamError>>;

/// Opens upstream stream connections.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open one stream connection authenticated by `token`.
    async fn connect(&self, token: &Token) -> Result<FrameStream, StreamError>;
}
