//! Session API
//!
//! JSON routes over `StreamGateway`. The caller's token travels in
//! `Authorization: Bearer <token>`.
//!
//! | Method | Path | Success | Errors |
//! |--------|------|---------|--------|
//! | POST | `/api/session` | 200 | 401 |
//! | DELETE | `/api/session` | 200 | 401 |
//! | PUT | `/api/session/keepalive` | 200 | 401, 404 |
//! | GET | `/api/session/items` | 200 | 401, 404 |
//! | GET | `/api/session/status` | 200 | 401, 404 |
//! | PUT | `/api/session/rules` | 200 | 401, 404, 502 |
//! | DELETE | `/api/session/rules` | 200 | 401, 404, 502 |

use std::sync::Arc;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::application::services::{GatewayError, SessionStatus};
use crate::domain::rules::Rule;
use crate::domain::session::Token;
use crate::domain::streaming::StreamItem;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", post(login).delete(logout))
        .route("/api/session/keepalive", put(keep_alive))
        .route("/api/session/items", get(fetch_items))
        .route("/api/session/status", get(session_status))
        .route("/api/session/rules", put(replace_rules).delete(clear_rules))
}

// =============================================================================
// Request / Response Bodies
// =============================================================================

/// Body of `PUT /api/session/rules`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceRulesRequest {
    /// The complete new rule set.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Acknowledgement body.
#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    /// Always `"ok"`.
    pub status: &'static str,
}

const OK: OkResponse = OkResponse { status: "ok" };

/// Error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable kind.
    pub error: &'static str,
    /// Human-readable message.
    pub message: String,
    /// For rule failures: whether previously active rules were deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_cleared: Option<bool>,
}

// =============================================================================
// Errors
// =============================================================================

/// Error returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No usable bearer token on the request.
    #[error("missing or malformed bearer token")]
    MissingToken,

    /// Gateway operation failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::Gateway(GatewayError::Auth(_)) => StatusCode::UNAUTHORIZED,
            Self::Gateway(GatewayError::NotFound) => StatusCode::NOT_FOUND,
            Self::Gateway(GatewayError::RuleSync(_)) => StatusCode::BAD_GATEWAY,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::Gateway(GatewayError::Auth(_)) => "unauthorized",
            Self::Gateway(GatewayError::NotFound) => "not_found",
            Self::Gateway(GatewayError::RuleSync(_)) => "rule_sync_failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let rules_cleared = match &self {
            Self::Gateway(GatewayError::RuleSync(e)) => Some(e.rules_cleared()),
            _ => None,
        };

        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
            rules_cleared,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

// =============================================================================
// Token Extraction
// =============================================================================

/// Token taken from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub Token);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|raw| Token::new(raw.trim()).ok())
            .map(Self)
            .ok_or(ApiError::MissingToken)
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn login(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<OkResponse>, ApiError> {
    state.gateway().login(token).await?;
    Ok(Json(OK))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Json<OkResponse> {
    state.gateway().logout(&token).await;
    Json(OK)
}

async fn keep_alive(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<OkResponse>, ApiError> {
    state.gateway().keep_alive(&token).await?;
    Ok(Json(OK))
}

async fn fetch_items(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<Vec<StreamItem>>, ApiError> {
    Ok(Json(state.gateway().fetch_items(&token).await?))
}

async fn session_status(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(state.gateway().session_status(&token).await?))
}

async fn replace_rules(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
    Json(request): Json<ReplaceRulesRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state.gateway().replace_rules(&token, request.rules).await?;
    Ok(Json(OK))
}

async fn clear_rules(
    State(state): State<Arc<AppState>>,
    BearerToken(token): BearerToken,
) -> Result<Json<OkResponse>, ApiError> {
    state.gateway().clear_rules(&token).await?;
    Ok(Json(OK))
}
