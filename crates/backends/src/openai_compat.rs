//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp, Groq, Together AI
//! and any endpoint exposing `/chat/completions`.
//!
//! Non-streaming calls hand back the provider's JSON body untouched as a
//! structured [`RawResponse`]; the response normalizer extracts the text.

use std::time::Duration;

use async_trait::async_trait;
use decentra_core::{
    Backend, BackendError, DispatchPayload, FragmentStream, PromptMessage, RawResponse,
    StreamFragment,
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::http::{LineBuffer, build_client, status_error, transport_error};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// An OpenAI-compatible model backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama backend (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert prompt messages to the chat-completions wire format.
    ///
    /// Metadata fields ride along on the message object but never replace
    /// `role` or `content`.
    fn to_api_messages(messages: &[PromptMessage]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|m| {
                let mut object = serde_json::Map::new();
                for (key, value) in &m.metadata {
                    if key != "role" && key != "content" {
                        object.insert(key.clone(), value.clone());
                    }
                }
                object.insert("role".into(), m.role.as_str().into());
                object.insert("content".into(), m.content.clone().into());
                serde_json::Value::Object(object)
            })
            .collect()
    }

    fn request_body(payload: &DispatchPayload, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": payload.model,
            "messages": Self::to_api_messages(&payload.messages),
            "stream": stream,
        });

        if let Some(temperature) = payload.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = payload.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        for (key, value) in &payload.extra {
            body[key.as_str()] = value.clone();
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        streaming: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if streaming {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request.json(body).send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            warn!(backend = %self.name, error = %err, "Backend returned error");
            return Err(err);
        }

        Ok(response)
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, payload: DispatchPayload) -> Result<RawResponse, BackendError> {
        let body = Self::request_body(&payload, false);

        debug!(backend = %self.name, model = %payload.model, "Sending completion request");

        let response = self.post(&body, false).await?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::api(format!("Failed to parse response: {e}")))?;

        Ok(RawResponse::Structured(value))
    }

    async fn dispatch_stream(&self, payload: DispatchPayload) -> Result<FragmentStream, BackendError> {
        let body = Self::request_body(&payload, true);

        debug!(backend = %self.name, model = %payload.model, "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let backend_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse fragments
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
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(Ok(StreamFragment { content: None, done: true })).await;
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(stream_resp) => {
                            let content = stream_resp
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|choice| choice.delta.content)
                                .filter(|c| !c.is_empty());

                            if let Some(content) = content {
                                let fragment = StreamFragment {
                                    content: Some(content),
                                    done: false,
                                };
                                if tx.send(Ok(fragment)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(
                                backend = %backend_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamFragment { content: None, done: true })).await;
        });

        Ok(rx)
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
