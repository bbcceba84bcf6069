//! Filter Rules
//!
//! A rule pairs a filter expression with a tag. The tag comes back on every
//! delivered item that the rule matched, so callers can tell which of their
//! rules produced it.
//!
//! Rules fetched from (or accepted by) the upstream carry an opaque id that
//! is only ever used to delete them again.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Rule
// =============================================================================

/// A filter expression and its label.
///
/// Serialized as `{"value": ..., "tag": ...}`, the upstream wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// Filter expression, e.g. `dog has:images -is:retweet`.
    #[serde(rename = "value")]
    pub pattern: String,
    /// Label reported back on matching items.
    #[serde(default)]
    pub tag: String,
}

impl Rule {
    /// Create a new rule.
    #[must_use]
    pub fn new(pattern: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            tag: tag.into(),
        }
    }
}

/// Opaque upstream identifier of a stored rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(#[serde(deserialize_with = "string_or_number")] String);

impl RuleId {
    /// Wrap an upstream id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Rule Set
// =============================================================================

/// One rule in a set, with its upstream id when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Upstream id, present when fetched from or accepted by the upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RuleId>,
    /// The rule itself.
    #[serde(flatten)]
    pub rule: Rule,
}

/// Ordered sequence of rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    entries: Vec<RuleEntry>,
}

impl RuleSet {
    /// Empty rule set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a set of rules that have not been stored upstream yet.
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            entries: rules
                .into_iter()
                .map(|rule| RuleEntry { id: None, rule })
                .collect(),
        }
    }

    /// Build a set from entries with ids.
    #[must_use]
    pub const fn from_entries(entries: Vec<RuleEntry>) -> Self {
        Self { entries }
    }

    /// All entries, in order.
    #[must_use]
    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    /// The rules without their ids, in order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.entries.iter().map(|entry| &entry.rule)
    }

    /// Ids of every entry that has one.
    #[must_use]
    pub fn ids(&self) -> Vec<RuleId> {
        self.entries
            .iter()
            .filter_map(|entry| entry.id.clone())
            .collect()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Accept an id written either as a JSON string or a JSON number.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
