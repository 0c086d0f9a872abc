//! Model gateway: retrying, optionally caching dispatcher to a backend.
//!
//! A single [`ModelGateway`] is built per process (see
//! [`ModelGateway::from_config`]) and shared behind an `Arc`. Every call runs
//! on the calling task: backoff waits suspend that task, and the only state
//! shared between calls is the response cache.
//!
//! ```text
//! non-streaming: resolve → cache check ─hit──────────────────────→ done
//!                                      └miss→ dispatch ─ok→ store → done
//!                                               ↑   │transient
//!                                               └backoff┘ (until budget spent)
//! streaming:     resolve → dispatch_stream (retried only until the stream opens)
//! ```

use std::future::Future;
use std::sync::Arc;

use decentra_backends::BackendRegistry;
use decentra_config::AppConfig;
use decentra_core::{
    Backend, BackendError, BackendErrorKind, DispatchPayload, Error, FragmentStream,
    PromptMessage, RawResponse, Result,
};
use tracing::{debug, error, info, warn};

use crate::cache::{ResponseCache, cache_key};
use crate::response::{collect_stream, normalize_response};
use crate::retry::RetryPolicy;

/// Model used when neither the call nor the configuration names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default number of memoized responses.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Per-call options for [`ModelGateway::complete`].
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Explicit model; overrides the configured default
    pub model: Option<String>,
    /// Return a fragment stream instead of a materialized response
    pub stream: bool,
    /// Memoize the response (ignored when streaming)
    pub cache: bool,
    /// Retry budget override; the gateway policy applies when unset
    pub max_retries: Option<u32>,
    /// Backend identifier; the registry default applies when unset or unknown
    pub backend: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Additional backend options forwarded verbatim
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CompletionOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// What a call produced.
#[derive(Debug)]
pub enum GatewayResult {
    /// A fully materialized backend response
    Response(RawResponse),
    /// A single-pass fragment stream (streaming calls only)
    Stream(FragmentStream),
}

impl GatewayResult {
    pub fn into_response(self) -> Option<RawResponse> {
        match self {
            GatewayResult::Response(raw) => Some(raw),
            GatewayResult::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<FragmentStream> {
        match self {
            GatewayResult::Stream(rx) => Some(rx),
            GatewayResult::Response(_) => None,
        }
    }
}

/// The resilient model-call gateway.
pub struct ModelGateway {
    registry: BackendRegistry,
    cache: ResponseCache,
    retry: RetryPolicy,
    default_model: Option<String>,
}

impl ModelGateway {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            cache: ResponseCache::new(DEFAULT_CACHE_CAPACITY),
            retry: RetryPolicy::default(),
            default_model: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = ResponseCache::new(capacity);
        self
    }

    pub fn with_default_model(mut self, model: Option<String>) -> Self {
        self.default_model = model.filter(|m| !m.trim().is_empty());
        self
    }

    /// Build the process-wide gateway from configuration.
    pub fn from_config(config: &AppConfig) -> Arc<Self> {
        let registry = decentra_backends::build_from_config(config);
        Arc::new(
            Self::new(registry)
                .with_retry_policy(RetryPolicy::from_config(&config.model_gateway))
                .with_cache_capacity(config.model_gateway.cache_capacity)
                .with_default_model(config.default_model.clone()),
        )
    }

    /// Explicit option, then configured default, then [`DEFAULT_MODEL`].
    pub fn resolve_model(&self, options: &CompletionOptions) -> String {
        options
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or(self.default_model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Dispatch a prompt to a backend.
    pub async fn complete(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<GatewayResult> {
        if options.stream {
            let (_, rx) = self.open_stream(messages, options).await?;
            return Ok(GatewayResult::Stream(rx));
        }

        self.complete_response(messages, options)
            .await
            .map(GatewayResult::Response)
    }

    /// Call normalized to plain text. Streaming calls are collected and
    /// never touch the cache.
    pub async fn complete_text(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        if !options.stream {
            let raw = self.complete_response(messages, options).await?;
            return Ok(normalize_response(&raw));
        }

        let (backend, rx) = self.open_stream(messages, options).await?;
        collect_stream(rx).await.map_err(|source| {
            error!(backend = %backend, error = %source, "Model stream failed");
            Error::ModelRequest { backend, source }
        })
    }

    async fn open_stream(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<(String, FragmentStream)> {
        let (backend, payload) = self.prepare(messages, options)?;
        debug!(backend = %backend.name(), model = %payload.model, "Opening model stream");
        let rx = self
            .dispatch_with_retry(backend.name(), self.max_retries(options), || {
                backend.dispatch_stream(payload.clone())
            })
            .await?;
        Ok((backend.name().to_string(), rx))
    }

    async fn complete_response(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<RawResponse> {
        let (backend, payload) = self.prepare(messages, options)?;

        let key = (options.cache && !options.stream).then(|| cache_key(&payload.model, messages));
        if let Some(ref key) = key {
            if let Some(hit) = self.cache.get(key) {
                debug!(model = %payload.model, "Model response served from cache");
                return Ok(hit);
            }
        }

        let call_id = uuid::Uuid::new_v4();
        debug!(
            %call_id,
            backend = %backend.name(),
            model = %payload.model,
            messages = messages.len(),
            "Dispatching model request"
        );

        let response = self
            .dispatch_with_retry(backend.name(), self.max_retries(options), || {
                backend.dispatch(payload.clone())
            })
            .await?;

        if let Some(key) = key {
            self.cache.insert(key, response.clone());
        }

        Ok(response)
    }

    fn max_retries(&self, options: &CompletionOptions) -> u32 {
        options.max_retries.unwrap_or(self.retry.max_retries)
    }

    fn prepare(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<(Arc<dyn Backend>, DispatchPayload)> {
        let backend = self.registry.resolve(options.backend.as_deref()).map_err(|e| {
            error!(error = %e, "No usable backend");
            e
        })?;

        let mut payload = DispatchPayload::new(self.resolve_model(options), messages.to_vec());
        payload.stream = options.stream;
        payload.temperature = options.temperature;
        payload.max_tokens = options.max_tokens;
        payload.extra = options.extra.clone();

        Ok((backend, payload))
    }

    /// Run `op` until it succeeds, fails permanently or spends the budget.
    async fn dispatch_with_retry<T, F, Fut>(
        &self,
        backend_name: &str,
        max_retries: u32,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, BackendError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(backend = backend_name, attempt, "Model request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.kind == BackendErrorKind::Unavailable {
                error!(backend = backend_name, error = %err, "Backend unavailable");
                return Err(Error::BackendUnavailable(format!("{backend_name}: {err}")));
            }

            if !err.is_transient() {
                error!(backend = backend_name, error = %err, "Model request rejected");
                return Err(Error::ModelRequest {
                    backend: backend_name.to_string(),
                    source: err,
                });
            }

            if attempt > max_retries {
                error!(
                    backend = backend_name,
                    attempts = attempt,
                    error = %err,
                    "Model request failed after {attempt} attempts"
                );
                return Err(Error::ModelUnavailable {
                    backend: backend_name.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                backend = backend_name,
                attempt,
                max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient model failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
