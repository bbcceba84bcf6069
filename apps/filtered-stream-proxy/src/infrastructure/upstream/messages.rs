//! Upstream Wire Messages
//!
//! Serde types for the filtered-stream rule endpoint and stream payloads.
//!
//! # Rules endpoint
//!
//! - `GET rules` → `{"data":[{"id":"..","value":"..","tag":".."}],"meta":{..}}`
//!   (`data` is absent when no rules are stored)
//! - `POST rules {"delete":{"ids":[..]}}` → 200
//! - `POST rules {"add":[{"value":"..","tag":".."}]}` → 201 with the stored rules
//!
//! # Stream
//!
//! Newline-delimited JSON objects:
//!
//! ```json
//! {"data":{"id":"1","text":"..."},"matching_rules":[{"id":"9","tag":"dogs"}]}
//! ```
//!
//! interleaved with blank keep-alive lines. Connection problems arrive as
//! problem objects:
//!
//! ```json
//! {"title":"ConnectionException","connection_issue":"TooManyConnections",
//!  "detail":"This stream is currently at the maximum allowed connection limit."}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::rules::{Rule, RuleEntry, RuleId, RuleSet, string_or_number};
use crate::domain::streaming::{MatchingRule, StreamItem};

/// Detail text of the account-level connection-limit problem.
pub const CONNECTION_LIMIT_DETAIL: &str =
    "This stream is currently at the maximum allowed connection limit.";

/// `connection_issue` value of the connection-limit problem.
pub const CONNECTION_ISSUE_TOO_MANY: &str = "TooManyConnections";

// =============================================================================
// Rules endpoint
// =============================================================================

/// Response of `GET rules` and `POST rules` (add).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesResponse {
    /// Stored rules; absent when there are none.
    #[serde(default)]
    pub data: Option<Vec<RuleEntry>>,
    /// Response metadata.
    #[serde(default)]
    pub meta: Option<RulesMeta>,
}

impl From<RulesResponse> for RuleSet {
    fn from(response: RulesResponse) -> Self {
        Self::from_entries(response.data.unwrap_or_default())
    }
}

/// Metadata attached to rule responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesMeta {
    /// Server timestamp of the response.
    #[serde(default)]
    pub sent: Option<String>,
    /// Number of rules in `data`.
    #[serde(default)]
    pub result_count: Option<u64>,
}

/// `POST rules` body adding rules.
#[derive(Debug, Serialize)]
pub struct AddRulesRequest<'a> {
    /// Rules to add.
    pub add: &'a [Rule],
}

/// `POST rules` body deleting rules.
#[derive(Debug, Serialize)]
pub struct DeleteRulesRequest<'a> {
    /// Ids to delete.
    pub delete: DeleteIds<'a>,
}

/// Id list inside a delete request.
#[derive(Debug, Serialize)]
pub struct DeleteIds<'a> {
    /// Rule ids.
    pub ids: &'a [RuleId],
}

// =============================================================================
// Stream payloads
// =============================================================================

/// A data frame from the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamPayload {
    /// The item body.
    pub data: ItemData,
    /// Rules that matched.
    #[serde(default)]
    pub matching_rules: Vec<MatchingRule>,
}

/// Item body inside a data frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    /// Item id.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Item text.
    pub text: String,
}

impl From<StreamPayload> for StreamItem {
    fn from(payload: StreamPayload) -> Self {
        Self::new(payload.data.id, payload.data.text, payload.matching_rules)
    }
}

/// Problem object sent on the stream or as an error body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemMessage {
    /// Short problem title.
    #[serde(default)]
    pub title: Option<String>,
    /// Human readable detail.
    #[serde(default)]
    pub detail: Option<String>,
    /// Machine readable connection issue.
    #[serde(default)]
    pub connection_issue: Option<String>,
    /// Problem type URI.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ProblemMessage {
    /// Whether this problem reports the account connection cap.
    #[must_use]
    pub fn is_connection_limit(&self) -> bool {
        self.detail.as_deref() == Some(CONNECTION_LIMIT_DETAIL)
            || self.connection_issue.as_deref() == Some(CONNECTION_ISSUE_TOO_MANY)
    }
}
