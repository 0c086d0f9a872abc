//! Backend trait: the abstraction over language-model endpoints.
//!
//! A Backend knows how to send a prompt payload to a model and hand back the
//! raw result, either fully materialized or as a stream of fragments. It does
//! not retry, cache, or interpret the response; the gateway does that.
//!
//! Implementations: OpenAI-compatible HTTP, Anthropic Messages API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::PromptMessage;

/// The request handed to a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// The resolved model identifier (e.g. "gpt-4o")
    pub model: String,

    /// The prompt messages, in order
    pub messages: Vec<PromptMessage>,

    /// Whether the caller asked for a fragment stream
    #[serde(default)]
    pub stream: bool,

    /// Sampling temperature, backend default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Additional backend options forwarded verbatim
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DispatchPayload {
    pub fn new(model: impl Into<String>, messages: Vec<PromptMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            temperature: None,
            max_tokens: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// A fully materialized backend result.
///
/// Backends differ in what they return: some hand back the provider's JSON
/// body untouched, others extract the text themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawResponse {
    Text(String),
    Structured(serde_json::Value),
}

impl From<String> for RawResponse {
    fn from(text: String) -> Self {
        RawResponse::Text(text)
    }
}

impl From<&str> for RawResponse {
    fn from(text: &str) -> Self {
        RawResponse::Text(text.to_string())
    }
}

impl From<serde_json::Value> for RawResponse {
    fn from(value: serde_json::Value) -> Self {
        RawResponse::Structured(value)
    }
}

/// A single partial-response fragment of a streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFragment {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,
}

/// A lazy, single-pass, non-restartable sequence of fragments.
///
/// Errors that occur after the stream is open arrive in-band and are never
/// retried.
pub type FragmentStream = tokio::sync::mpsc::Receiver<Result<StreamFragment, BackendError>>;

/// The core Backend trait.
///
/// Each implementation maps its native failures into [`BackendError`] kinds so
/// the gateway can tell transient from permanent failures without knowing
/// which backend it is talking to.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable identifier (e.g. "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a payload and get the complete raw response.
    async fn dispatch(&self, payload: DispatchPayload) -> Result<RawResponse, BackendError>;

    /// Send a payload and get a stream of fragments.
    ///
    /// Default implementation calls `dispatch()` and wraps the textual result
    /// as a single final fragment.
    async fn dispatch_stream(&self, payload: DispatchPayload) -> Result<FragmentStream, BackendError> {
        let response = self.dispatch(payload).await?;
        let content = match response {
            RawResponse::Text(text) => text,
            RawResponse::Structured(value) => value.to_string(),
        };
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamFragment {
                content: Some(content),
                done: true,
            }))
            .await;
        Ok(rx)
    }
}
