//! HTTP surface for Decentra.
//!
//! Exposes a health check and the v1 summary API. Every request runs the
//! verb to completion on its own task; the only state shared between
//! requests is the orchestrator (and through it, the response cache).
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use decentra_config::AppConfig;
use decentra_engine::Orchestrator;

pub use api_v1::{ApiV1State, EmailSummaryBody, ErrorResponse, SharedApiState, TwitterSummaryBody};

/// Build the full router: `/health` plus the v1 API.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - In-memory rate limiting (`rate_limit_per_minute` per client)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState, rate_limit_per_minute: u32) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(
        rate_limit_per_minute as usize,
        std::time::Duration::from_secs(60),
    ));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the HTTP server and serve until the process exits.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let orchestrator = Orchestrator::from_config(&config);
    if orchestrator.gateway().registry().default().is_none() {
        warn!(
            backend = %config.default_backend,
            "Default backend not configured; summary requests will fail until an API key is set"
        );
    }
    let sources = orchestrator.sources().list();
    if sources.is_empty() {
        warn!("No content sources configured; summaries will report degraded retrieval");
    }

    let state = Arc::new(ApiV1State {
        orchestrator,
        cache_by_default: config.server.cache_responses,
    });
    let app = build_router(state, u32::try_from(config.server.rate_limit_per_minute).unwrap_or(u32::MAX));

    info!(addr = %addr, sources = ?sources, "Server starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// In-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key. Thread-safe via
/// `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: std::time::Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: std::time::Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is within its budget.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Client key: first `X-Forwarded-For` hop, then the `Authorization` header,
/// then "anonymous". `/health` is exempt.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> axum::response::Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let headers = req.headers();
    let client_key = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "rate limit exceeded, slow down".into(),
            }),
        )
            .into_response();
    }

    next.run(req).await
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
