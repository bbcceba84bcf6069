//! Stream Item Types
//!
//! The canonical internal representation of an item delivered by the
//! filtered stream, and the connection states of a stream client.

use serde::{Deserialize, Serialize};

use super::rules::string_or_number;

/// Reference to the rule that caused an item to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRule {
    /// Upstream rule id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Tag of the matching rule.
    #[serde(default)]
    pub tag: String,
}

/// An item received from the filtered stream.
///
/// Only built by the frame codec; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamItem {
    /// Upstream item id.
    pub id: String,
    /// Item text.
    pub text: String,
    /// Rules that matched this item.
    pub matching_rules: Vec<MatchingRule>,
}

impl StreamItem {
    /// Create a new stream item.
    #[must_use]
    pub const fn new(id: String, text: String, matching_rules: Vec<MatchingRule>) -> Self {
        Self {
            id,
            text,
            matching_rules,
        }
    }

    /// Tags of every matching rule, in delivery order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.matching_rules.iter().map(|rule| rule.tag.as_str())
    }
}

/// Connection state of a stream client.
///
/// ```text
/// Connecting ──first frame──► Streaming ──reset──► Backoff ──delay──► Connecting
///      │                          │                   │
///      └────── stop / fatal ──────┴───────────────────┴──► Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Opening the upstream connection.
    Connecting,
    /// Connected and receiving frames.
    Streaming,
    /// Waiting out a reconnect delay.
    Backoff,
    /// Stopped for good. No further connection attempts.
    Terminated,
}

impl ConnectionState {
    /// Whether no further connection attempts will happen.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// State name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
            Self::Terminated => "terminated",
        }
    }
}
