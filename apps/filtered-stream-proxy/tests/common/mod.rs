//! Shared test doubles for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::time::Instant;

use filtered_stream_proxy::{
    FrameStream, RegistryConfig, ReconnectConfig, Rule, RuleEntry, RuleId, RuleSet,
    RuleSyncPort, SessionConfig, SessionRegistry, StreamClientConfig, StreamConnector,
    StreamError, Token, UpstreamError,
};

pub const DATA_A: &str = r#"{"data":{"id":"1","text":"A"},"matching_rules":[{"id":"10","tag":"cats"}]}"#;
pub const DATA_B: &str = r#"{"data":{"id":"2","text":"B"},"matching_rules":[{"id":"10","tag":"cats"}]}"#;
pub const DATA_C: &str = r#"{"data":{"id":"3","text":"C"},"matching_rules":[]}"#;
pub const CONNECTION_LIMIT: &str =
    "This stream is currently at the maximum allowed connection limit.";

pub fn token(value: &str) -> Token {
    Token::new(value).unwrap()
}

// =============================================================================
// Stream connector
// =============================================================================

/// What one connection attempt does.
pub enum Plan {
    /// Fail to connect.
    Fail(StreamError),
    /// Deliver these frames, then close.
    Close(Vec<String>),
    /// Deliver these frames, then stay open without sending anything.
    Hold(Vec<String>),
    /// Deliver whatever is pushed through the paired sender.
    Live(mpsc::UnboundedReceiver<String>),
}

/// Connector that plays back a queue of plans and records when each
/// connection attempt happened.
pub struct ScriptedConnector {
    plans: Mutex<VecDeque<Plan>>,
    fallback: fn() -> Plan,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedConnector {
    /// Once the queue is empty every attempt fails with a reset.
    pub fn failing_after(plans: Vec<Plan>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            fallback: || Plan::Fail(StreamError::Reset("connection refused".to_string())),
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Once the queue is empty every attempt connects and stays silent.
    pub fn idle_after(plans: Vec<Plan>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            fallback: || Plan::Hold(Vec::new()),
            attempts: Mutex::new(Vec::new()),
        })
    }

    /// Queue a live connection and return its sender.
    pub fn push_live(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded();
        self.plans.lock().push_back(Plan::Live(rx));
        tx
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Gaps between consecutive connection attempts.
    pub fn gaps(&self) -> Vec<Duration> {
        self.attempts
            .lock()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&self, _token: &Token) -> Result<FrameStream, StreamError> {
        self.attempts.lock().push(Instant::now());

        let plan = self
            .plans
            .lock()
            .pop_front()
            .unwrap_or_else(self.fallback);

        match plan {
            Plan::Fail(e) => Err(e),
            Plan::Close(frames) => Ok(stream::iter(frames.into_iter().map(Ok)).boxed()),
            Plan::Hold(frames) => Ok(stream::iter(frames.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Plan::Live(rx) => Ok(rx.map(Ok).boxed()),
        }
    }
}

pub fn frames(frames: &[&str]) -> Vec<String> {
    frames.iter().map(|f| (*f).to_string()).collect()
}

// =============================================================================
// Rule sync
// =============================================================================

/// In-memory rules endpoint.
#[derive(Default)]
pub struct FakeRuleSync {
    accepted: Mutex<HashSet<String>>,
    rules: Mutex<HashMap<String, Vec<RuleEntry>>>,
    next_id: Mutex<u64>,
    fail_add: Mutex<bool>,
}

impl FakeRuleSync {
    pub fn accepting(tokens: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        fake.accepted
            .lock()
            .extend(tokens.iter().map(|t| (*t).to_string()));
        Arc::new(fake)
    }

    pub fn seed(&self, token: &str, rules: &[Rule]) {
        let entries = rules
            .iter()
            .map(|rule| RuleEntry {
                id: Some(self.allocate_id()),
                rule: rule.clone(),
            })
            .collect();
        self.rules.lock().insert(token.to_string(), entries);
    }

    pub fn fail_adds(&self) {
        *self.fail_add.lock() = true;
    }

    pub fn stored(&self, token: &str) -> Vec<Rule> {
        self.rules
            .lock()
            .get(token)
            .map(|entries| entries.iter().map(|e| e.rule.clone()).collect())
            .unwrap_or_default()
    }

    fn allocate_id(&self) -> RuleId {
        let mut next = self.next_id.lock();
        *next += 1;
        RuleId::new(next.to_string())
    }

    fn check(&self, token: &Token) -> Result<(), UpstreamError> {
        if self.accepted.lock().contains(token.expose()) {
            Ok(())
        } else {
            Err(UpstreamError::Status {
                status: 401,
                detail: "Unauthorized".to_string(),
            })
        }
    }
}

#[async_trait]
impl RuleSyncPort for FakeRuleSync {
    async fn get_rules(&self, token: &Token) -> Result<RuleSet, UpstreamError> {
        self.check(token)?;
        let entries = self
            .rules
            .lock()
            .get(token.expose())
            .cloned()
            .unwrap_or_default();
        Ok(RuleSet::from_entries(entries))
    }

    async fn delete_rules(&self, token: &Token, ids: &[RuleId]) -> Result<(), UpstreamError> {
        self.check(token)?;
        if let Some(entries) = self.rules.lock().get_mut(token.expose()) {
            entries.retain(|entry| entry.id.as_ref().is_none_or(|id| !ids.contains(id)));
        }
        Ok(())
    }

    async fn add_rules(&self, token: &Token, rules: &[Rule]) -> Result<RuleSet, UpstreamError> {
        self.check(token)?;
        if *self.fail_add.lock() {
            return Err(UpstreamError::Status {
                status: 400,
                detail: "invalid rule".to_string(),
            });
        }

        let added: Vec<RuleEntry> = rules
            .iter()
            .map(|rule| RuleEntry {
                id: Some(self.allocate_id()),
                rule: rule.clone(),
            })
            .collect();
        self.rules
            .lock()
            .entry(token.expose().to_string())
            .or_default()
            .extend(added.iter().cloned());
        Ok(RuleSet::from_entries(added))
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn stream_config() -> StreamClientConfig {
    StreamClientConfig {
        reconnect: ReconnectConfig::exponential(Duration::from_secs(1), Duration::from_secs(64)),
        stall_timeout: None,
    }
}

pub fn registry(
    rule_sync: Arc<FakeRuleSync>,
    connector: Arc<ScriptedConnector>,
    capacity: usize,
    sweep_interval: Duration,
) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        rule_sync,
        connector,
        RegistryConfig {
            session: SessionConfig {
                buffer_capacity: NonZeroUsize::new(capacity).unwrap(),
                stream: stream_config(),
            },
            sweep_interval,
        },
    ))
}
