//! Backend registry: maps identifiers to backends.
//!
//! Populated once at startup from configuration. Lookups of unknown
//! identifiers fall back to the default backend with a warning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use decentra_config::{AppConfig, BackendConfig};
use decentra_core::{Backend, Error, Result};
use tracing::{debug, warn};

use crate::anthropic::AnthropicBackend;
use crate::openai_compat::OpenAiCompatBackend;

/// Identifiers of local endpoints that work without an API key.
const KEYLESS_BACKENDS: &[&str] = &["ollama", "vllm", "llamacpp", "llama.cpp"];

/// Routes model calls to the correct backend.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
    default_backend: String,
}

impl BackendRegistry {
    /// Create an empty registry with a default backend identifier.
    pub fn new(default_backend: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_backend: default_backend.into(),
        }
    }

    /// Register a backend.
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        self.backends.insert(name.into(), backend);
    }

    /// Get the default backend, if registered.
    pub fn default(&self) -> Option<Arc<dyn Backend>> {
        self.backends.get(&self.default_backend).cloned()
    }

    pub fn default_name(&self) -> &str {
        &self.default_backend
    }

    /// Get a specific backend by identifier.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    /// Resolve the backend for a call.
    ///
    /// An unknown identifier logs a warning and falls back to the default;
    /// a missing default is `BackendUnavailable`.
    pub fn resolve(&self, requested: Option<&str>) -> Result<Arc<dyn Backend>> {
        if let Some(name) = requested.filter(|n| !n.is_empty()) {
            if let Some(backend) = self.get(name) {
                return Ok(backend);
            }
            warn!(
                requested = name,
                fallback = %self.default_backend,
                "Unknown backend, falling back to default"
            );
        }

        self.default().ok_or_else(|| {
            Error::BackendUnavailable(format!(
                "default backend '{}' is not registered (missing credentials?)",
                self.default_backend
            ))
        })
    }

    /// List all registered backend identifiers.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build backends from configuration.
///
/// Backends that need an API key but have none are skipped with a warning,
/// so a call routed to them resolves as unavailable instead of failing with
/// an authentication error on every attempt.
pub fn build_from_config(config: &AppConfig) -> BackendRegistry {
    let mut registry = BackendRegistry::new(&config.default_backend);
    let timeout = Duration::from_secs(config.model_gateway.request_timeout_secs);

    for (name, backend_config) in &config.backends {
        if let Some(backend) = build_backend(name, backend_config, config, timeout) {
            registry.register(name.clone(), backend);
        }
    }

    // Ensure the default backend exists (even if not explicitly configured)
    if registry.get(&config.default_backend).is_none() {
        if let Some(backend) = build_backend(
            &config.default_backend,
            &BackendConfig::default(),
            config,
            timeout,
        ) {
            registry.register(config.default_backend.clone(), backend);
        }
    }

    debug!(backends = ?registry.list(), default = %config.default_backend, "Backends registered");
    registry
}

fn build_backend(
    name: &str,
    backend_config: &BackendConfig,
    config: &AppConfig,
    timeout: Duration,
) -> Option<Arc<dyn Backend>> {
    let kind = backend_config.kind.as_deref().unwrap_or(name);
    let keyless = KEYLESS_BACKENDS.contains(&name) || KEYLESS_BACKENDS.contains(&kind);

    let api_key = backend_config
        .api_key
        .clone()
        .or_else(|| config.api_key.clone());

    let api_key = match api_key {
        Some(key) => key,
        None if keyless => "none".into(),
        None => {
            warn!(backend = name, "No API key configured, backend not registered");
            return None;
        }
    };

    let backend: Arc<dyn Backend> = if kind == "anthropic" {
        let mut b = AnthropicBackend::new(api_key).with_timeout(timeout);
        if let Some(url) = &backend_config.api_url {
            b = b.with_base_url(url);
        }
        Arc::new(b)
    } else {
        let base_url = backend_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));
        Arc::new(OpenAiCompatBackend::new(name, base_url, api_key).with_timeout(timeout))
    };

    Some(backend)
}

/// Get the default base URL for well-known OpenAI-compatible endpoints.
pub fn default_base_url(backend_name: &str) -> String {
    match backend_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
