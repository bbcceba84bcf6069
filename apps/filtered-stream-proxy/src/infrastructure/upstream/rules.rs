//! Rule Sync HTTP Client
//!
//! `RuleSyncPort` over the upstream rules endpoint. Every request carries
//! the session token as a bearer credential. Status expectations:
//!
//! - `GET rules` → 200
//! - `POST rules` delete → 200
//! - `POST rules` add → 201; any other status is surfaced with its body
//!
//! No retries: failures are reported to the caller as they happen.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::messages::{AddRulesRequest, DeleteIds, DeleteRulesRequest, RulesResponse};
use crate::application::ports::{RuleSyncPort, UpstreamError};
use crate::domain::rules::{Rule, RuleId, RuleSet};
use crate::domain::session::Token;
use crate::infrastructure::config::UpstreamSettings;

/// HTTP client for the upstream rules endpoint.
#[derive(Debug, Clone)]
pub struct RuleSyncClient {
    client: Client,
    rules_url: String,
}

impl RuleSyncClient {
    /// Create a client from upstream settings.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Transport` if the HTTP client cannot be built.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self::with_client(client, settings.rules_url.clone()))
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub const fn with_client(client: Client, rules_url: String) -> Self {
        Self { client, rules_url }
    }

    async fn read_rules(
        response: reqwest::Response,
        expected: StatusCode,
    ) -> Result<RuleSet, UpstreamError> {
        let response = Self::expect_status(response, expected).await?;
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        if text.trim().is_empty() {
            return Ok(RuleSet::empty());
        }

        let body: RulesResponse =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(body.into())
    }

    async fn expect_status(
        response: reqwest::Response,
        expected: StatusCode,
    ) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status == expected {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), detail = %detail, "Rules endpoint returned error");

        Err(UpstreamError::Status {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl RuleSyncPort for RuleSyncClient {
    async fn get_rules(&self, token: &Token) -> Result<RuleSet, UpstreamError> {
        let response = self
            .client
            .get(&self.rules_url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Self::read_rules(response, StatusCode::OK).await
    }

    async fn delete_rules(&self, token: &Token, ids: &[RuleId]) -> Result<(), UpstreamError> {
        let body = DeleteRulesRequest {
            delete: DeleteIds { ids },
        };

        let response = self
            .client
            .post(&self.rules_url)
            .bearer_auth(token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Self::expect_status(response, StatusCode::OK).await?;
        Ok(())
    }

    async fn add_rules(&self, token: &Token, rules: &[Rule]) -> Result<RuleSet, UpstreamError> {
        let body = AddRulesRequest { add: rules };

        let response = self
            .client
            .post(&self.rules_url)
            .bearer_auth(token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Self::read_rules(response, StatusCode::CREATED).await
    }
}
