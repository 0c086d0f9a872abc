//! Anthropic native backend implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Streaming via SSE with `content_block_delta` events
//!
//! Unlike the OpenAI-compatible backend this one extracts the text itself and
//! returns a textual [`RawResponse`].

use std::time::Duration;

use async_trait::async_trait;
use decentra_core::{
    Backend, BackendError, DispatchPayload, FragmentStream, PromptMessage, RawResponse, Role,
    StreamFragment,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::http::{LineBuffer, build_client, status_error, transport_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Anthropic native Messages API backend.
pub struct AnthropicBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    /// Create a new Anthropic backend.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Split system messages out of the message list.
    fn extract_system(messages: &[PromptMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut rest = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                Role::User | Role::Assistant => rest.push(AnthropicMessage {
                    role: msg.role.as_str().into(),
                    content: msg.content.clone(),
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, rest)
    }

    fn request_body(payload: &DispatchPayload, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&payload.messages);

        let mut body = serde_json::json!({
            "model": payload.model,
            "messages": messages,
            "max_tokens": payload.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if let Some(temperature) = payload.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        for (key, value) in &payload.extra {
            body[key.as_str()] = value.clone();
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            warn!(error = %err, "Anthropic API error");
            return Err(err);
        }

        Ok(response)
    }

    /// Join the text blocks of a response.
    fn response_text(resp: AnthropicResponse) -> String {
        resp.content
            .into_iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text),
                ResponseContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, payload: DispatchPayload) -> Result<RawResponse, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::unavailable("Anthropic API key is not set"));
        }

        let body = Self::request_body(&payload, false);

        debug!(backend = "anthropic", model = %payload.model, "Sending completion request");

        let response = self.post(&body).await?;

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            BackendError::api(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Ok(RawResponse::Text(Self::response_text(api_resp)))
    }

    async fn dispatch_stream(&self, payload: DispatchPayload) -> Result<FragmentStream, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::unavailable("Anthropic API key is not set"));
        }

        let body = Self::request_body(&payload, true);

        debug!(backend = "anthropic", model = %payload.model, "Sending streaming request");

        let response = self.post(&body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::connection(format!(
                                "stream interrupted: {e}"
                            ))))
                            .await;
                        return;
                    }
                };

                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    // Typed events carry their payload on the following data line
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    let event: serde_json::Value = match serde_json::from_str(data.trim()) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };

                    match event["type"].as_str().unwrap_or("") {
                        "content_block_delta" => {
                            let delta = &event["delta"];
                            if delta["type"].as_str() != Some("text_delta") {
                                continue;
                            }
                            if let Some(text) = delta["text"].as_str() {
                                let fragment = StreamFragment {
                                    content: Some(text.to_string()),
                                    done: false,
                                };
                                if tx.send(Ok(fragment)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        "message_stop" => {
                            let _ = tx.send(Ok(StreamFragment { content: None, done: true })).await;
                            return;
                        }
                        "error" => {
                            let message = event["error"]["message"]
                                .as_str()
                                .unwrap_or("unknown stream error")
                                .to_string();
                            let _ = tx.send(Err(BackendError::api(message))).await;
                            return;
                        }
                        _ => {}
                    }
                }
            }

            // Stream ended without message_stop
            let _ = tx.send(Ok(StreamFragment { content: None, done: true })).await;
        });

        Ok(rx)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}
