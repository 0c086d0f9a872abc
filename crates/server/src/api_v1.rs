//! HTTP API v1: summary endpoints.
//!
//! Endpoints:
//!
//! - `POST /v1/summary/email`: Summarize recent mail
//! - `POST /v1/summary/twitter`: Summarize recent posts by a set of accounts
//!
//! Request bodies carry the same parameters as the CLI flags; the CLI's
//! remote mode posts exactly these types.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use decentra_core::{Error, parse_since};
use decentra_engine::verbs::{DEFAULT_LOOKBACK_HOURS, DEFAULT_SOCIAL_MAX_RESULTS};
use decentra_engine::{EmailSummaryRequest, Orchestrator, SocialSummaryRequest, SummaryReport};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub orchestrator: Orchestrator,
    /// Whether requests that do not say otherwise use the response cache
    pub cache_by_default: bool,
}

pub type SharedApiState = Arc<ApiV1State>;

/// Build the v1 API router (mounted under `/v1`).
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/summary/email", post(email_summary_handler))
        .route("/summary/twitter", post(twitter_summary_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK_HOURS
}

fn default_unread_only() -> bool {
    true
}

fn default_max_results() -> u32 {
    DEFAULT_SOCIAL_MAX_RESULTS
}

/// Body of `POST /v1/summary/email`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSummaryBody {
    /// Hours to look back
    #[serde(default = "default_lookback")]
    pub lookback_window: u32,
    #[serde(default = "default_unread_only")]
    pub unread_only: bool,
    /// Backend identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_connection: Option<String>,
    /// RFC 3339 window start; overrides `lookback_window`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

impl Default for EmailSummaryBody {
    fn default() -> Self {
        Self {
            lookback_window: DEFAULT_LOOKBACK_HOURS,
            unread_only: true,
            llm_connection: None,
            since: None,
            cache: None,
        }
    }
}

impl EmailSummaryBody {
    pub fn into_request(self, cache_by_default: bool) -> Result<EmailSummaryRequest, Error> {
        Ok(EmailSummaryRequest {
            lookback_hours: self.lookback_window,
            unread_only: self.unread_only,
            since: self.since.as_deref().map(parse_since).transpose()?,
            backend: self.llm_connection,
            cache: self.cache.unwrap_or(cache_by_default),
        })
    }
}

/// Body of `POST /v1/summary/twitter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwitterSummaryBody {
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default = "default_lookback")]
    pub lookback_window: u32,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

impl Default for TwitterSummaryBody {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            lookback_window: DEFAULT_LOOKBACK_HOURS,
            max_results: DEFAULT_SOCIAL_MAX_RESULTS,
            llm_connection: None,
            since: None,
            cache: None,
        }
    }
}

impl TwitterSummaryBody {
    pub fn into_request(self, cache_by_default: bool) -> Result<SocialSummaryRequest, Error> {
        Ok(SocialSummaryRequest {
            accounts: self.accounts,
            lookback_hours: self.lookback_window,
            max_results: self.max_results,
            since: self.since.as_deref().map(parse_since).transpose()?,
            backend: self.llm_connection,
            cache: self.cache.unwrap_or(cache_by_default),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A domain error rendered as an HTTP response.
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::ModelRequest { .. } => StatusCode::BAD_GATEWAY,
            Error::ModelUnavailable { .. } | Error::BackendUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn email_summary_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<EmailSummaryBody>,
) -> Result<Json<SummaryReport>, ApiError> {
    info!(
        lookback = payload.lookback_window,
        unread_only = payload.unread_only,
        "v1/summary/email request"
    );

    let request = payload.into_request(state.cache_by_default)?;
    let report = state
        .orchestrator
        .summarize_email(request)
        .await
        .inspect_err(|e| error!(error = %e, "Email summary failed"))?;

    Ok(Json(report))
}

async fn twitter_summary_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<TwitterSummaryBody>,
) -> Result<Json<SummaryReport>, ApiError> {
    info!(
        accounts = payload.accounts.len(),
        lookback = payload.lookback_window,
        "v1/summary/twitter request"
    );

    let request = payload.into_request(state.cache_by_default)?;
    let report = state
        .orchestrator
        .summarize_social(request)
        .await
        .inspect_err(|e| error!(error = %e, "Social summary failed"))?;

    Ok(Json(report))
}
