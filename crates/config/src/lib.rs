//! Configuration loading, validation, and management for Decentra.
//!
//! Loads configuration from `~/.decentra/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.decentra/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by backends that don't set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Identifier of the backend used when a call names none (or an unknown one)
    #[serde(default = "default_backend")]
    pub default_backend: String,

    /// Default model; the gateway falls back to a built-in identifier when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Remote server URL; when set, CLI actions are forwarded over HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Retry and cache behavior of the model gateway
    #[serde(default)]
    pub model_gateway: ModelGatewayConfig,

    /// Backend-specific configurations
    #[serde(default)]
    pub backends: HashMap<String, BackendConfig>,

    /// Organizational context documents
    #[serde(default)]
    pub context: ContextConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Retrieval adapter credentials
    #[serde(default)]
    pub inputs: InputsConfig,
}

fn default_backend() -> String {
    "openai".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_backend", &self.default_backend)
            .field("default_model", &self.default_model)
            .field("api_url", &self.api_url)
            .field("model_gateway", &self.model_gateway)
            .field("backends", &self.backends)
            .field("context", &self.context)
            .field("server", &self.server)
            .field("inputs", &self.inputs)
            .finish()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl std::fmt::Debug for GmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailConfig")
            .field("access_token", &redact(&self.access_token))
            .field("max_results", &self.max_results)
            .finish()
    }
}

impl std::fmt::Debug for TwitterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterConfig")
            .field("bearer_token", &redact(&self.bearer_token))
            .finish()
    }
}

/// Retry policy and cache sizing for model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelGatewayConfig {
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the first retry, in seconds
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,

    /// Multiplier applied to the wait after each retry
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Maximum number of memoized responses
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Per-request timeout enforced by HTTP backends
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    6
}
fn default_initial_delay_secs() -> f64 {
    1.0
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_cache_capacity() -> usize {
    256
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ModelGatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_factor: default_backoff_factor(),
            cache_capacity: default_cache_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Implementation to use: "openai" (any OpenAI-compatible endpoint) or
    /// "anthropic". Defaults from the identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// A named context document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSectionConfig {
    /// File name relative to the context directory
    pub file: String,

    /// Heading shown in the system prompt
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Directory holding the context documents; defaults to `~/.decentra/context`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Sections in prompt order
    #[serde(default = "default_sections")]
    pub sections: Vec<ContextSectionConfig>,

    /// Replace the built-in role preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_sections() -> Vec<ContextSectionConfig> {
    [
        ("objectives.yaml", "Objectives"),
        ("priorities.yaml", "Priorities"),
        ("the_future.yaml", "Outlook"),
        ("features_of_success.yaml", "Methodology"),
    ]
    .into_iter()
    .map(|(file, title)| ContextSectionConfig {
        file: file.into(),
        title: title.into(),
    })
    .collect()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            dir: None,
            sections: default_sections(),
            system_prompt_override: None,
        }
    }
}

impl ContextConfig {
    /// The directory context documents are read from.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("context"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Requests allowed per client per minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,

    /// Memoize summaries served over HTTP
    #[serde(default)]
    pub cache_responses: bool,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_rate_limit() -> usize {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            rate_limit_per_minute: default_rate_limit(),
            cache_responses: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub gmail: GmailConfig,

    #[serde(default)]
    pub twitter: TwitterConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// OAuth access token with the gmail.readonly scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Upper bound on messages listed per query
    #[serde(default = "default_gmail_max_results")]
    pub max_results: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_gmail_max_results() -> u32 {
    100
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            max_results: default_gmail_max_results(),
            enabled: true,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// App bearer token for the v2 API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.decentra/config.toml).
    ///
    /// Environment variables are applied on top, see [`AppConfig::apply_env`].
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// - `DECENTRA_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `DECENTRA_BACKEND`
    /// - `DECENTRA_MODEL`, then `OPENAI_MODEL`
    /// - `DECENTRA_API_URL`
    /// - `DECENTRA_CONTEXT_DIR`
    /// - `GMAIL_ACCESS_TOKEN`, `TWITTER_BEARER_TOKEN`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("DECENTRA_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
        }

        if let Some(backend) = non_empty("DECENTRA_BACKEND") {
            self.default_backend = backend;
        }

        if let Some(model) = non_empty("DECENTRA_MODEL").or_else(|| non_empty("OPENAI_MODEL")) {
            self.default_model = Some(model);
        }

        if let Some(url) = non_empty("DECENTRA_API_URL") {
            self.api_url = Some(url);
        }

        if let Some(dir) = non_empty("DECENTRA_CONTEXT_DIR") {
            self.context.dir = Some(dir);
        }

        if let Some(token) = non_empty("GMAIL_ACCESS_TOKEN") {
            self.inputs.gmail.access_token = Some(token);
        }

        if let Some(token) = non_empty("TWITTER_BEARER_TOKEN") {
            self.inputs.twitter.bearer_token = Some(token);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".decentra")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let gateway = &self.model_gateway;

        if gateway.cache_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "model_gateway.cache_capacity must be at least 1".into(),
            ));
        }

        if gateway.initial_delay_secs.is_nan() || gateway.initial_delay_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "model_gateway.initial_delay_secs must be > 0".into(),
            ));
        }

        if gateway.backoff_factor < 1.0 {
            return Err(ConfigError::ValidationError(
                "model_gateway.backoff_factor must be >= 1.0".into(),
            ));
        }

        if self.server.rate_limit_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "server.rate_limit_per_minute must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_backend: default_backend(),
            default_model: None,
            api_url: None,
            model_gateway: ModelGatewayConfig::default(),
            backends: HashMap::new(),
            context: ContextConfig::default(),
            server: ServerConfig::default(),
            inputs: InputsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_backend, "openai");
        assert_eq!(config.model_gateway.max_retries, 6);
        assert_eq!(config.model_gateway.cache_capacity, 256);
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_backend, config.default_backend);
        assert_eq!(parsed.context.sections, config.context.sections);
    }

    #[test]
    fn default_sections_in_fixed_order() {
        let titles: Vec<_> = ContextConfig::default()
            .sections
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, ["Objectives", "Priorities", "Outlook", "Methodology"]);
    }

    #[test]
    fn zero_cache_capacity_rejected() {
        let mut config = AppConfig::default();
        config.model_gateway.cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shrinking_backoff_rejected() {
        let mut config = AppConfig::default();
        config.model_gateway.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_backend, "openai");
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_backend = "anthropic"
default_model = "claude-sonnet-4"

[model_gateway]
max_retries = 2
cache_capacity = 8

[backends.anthropic]
api_key = "sk-ant-test"

[context]
dir = "/srv/decentra/context"
sections = [{ file = "goals.md", title = "Goals" }]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_backend, "anthropic");
        assert_eq!(config.default_model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(config.model_gateway.max_retries, 2);
        assert!((config.model_gateway.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.context.sections.len(), 1);
        assert_eq!(config.context.resolved_dir(), PathBuf::from("/srv/decentra/context"));
        assert!(config.backends["anthropic"].api_key.is_some());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_backend = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("DECENTRA_API_URL", "http://localhost:8000"),
            ("TWITTER_BEARER_TOKEN", "bearer"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.inputs.twitter.bearer_token.as_deref(), Some("bearer"));
    }

    #[test]
    fn decentra_vars_win_over_openai_vars() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("DECENTRA_API_KEY", "sk-decentra"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("DECENTRA_MODEL", "gpt-4.1"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-decentra"));
        assert_eq!(config.default_model.as_deref(), Some("gpt-4.1"));
    }

    #[test]
    fn configured_key_not_replaced_by_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(env_from(&[("OPENAI_API_KEY", "from-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn empty_env_values_ignored() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[("OPENAI_MODEL", "  ")]));
        assert!(config.default_model.is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.inputs.gmail.access_token = Some("ya29.secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("ya29.secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
