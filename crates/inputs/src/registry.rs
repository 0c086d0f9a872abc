//! Source registry: holds the retrieval adapters that have credentials.
//!
//! A source without credentials is never registered; the orchestrator
//! treats a missing source as a degraded, empty fetch.

use std::collections::HashMap;
use std::sync::Arc;

use decentra_config::AppConfig;
use decentra_core::ContentSource;
use tracing::{info, warn};

use crate::gmail::GmailSource;
use crate::twitter::TwitterSource;

/// Central registry holding all configured sources.
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn ContentSource>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register a source under its own name.
    pub fn register(&mut self, source: Arc<dyn ContentSource>) {
        let name = source.name().to_string();
        info!(source = %name, "Registered source");
        self.sources.insert(name, source);
    }

    /// Get a source by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentSource>> {
        self.sources.get(name).cloned()
    }

    /// List all registered source names.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Build sources from configuration.
pub fn build_from_config(config: &AppConfig) -> SourceRegistry {
    let mut registry = SourceRegistry::new();

    let gmail = &config.inputs.gmail;
    match (&gmail.access_token, gmail.enabled) {
        (Some(token), true) => {
            registry.register(Arc::new(GmailSource::new(token.clone(), gmail.max_results)));
        }
        (None, true) => warn!("Gmail access token missing, email source disabled"),
        (_, false) => {}
    }

    let twitter = &config.inputs.twitter;
    match (&twitter.bearer_token, twitter.enabled) {
        (Some(token), true) => registry.register(Arc::new(TwitterSource::new(token.clone()))),
        (None, true) => warn!("Twitter bearer token missing, social source disabled"),
        (_, false) => {}
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use decentra_core::source::{EMAIL_SOURCE, SOCIAL_SOURCE};

    #[test]
    fn no_credentials_no_sources() {
        let registry = build_from_config(&AppConfig::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn credentials_register_sources() {
        let mut config = AppConfig::default();
        config.inputs.gmail.access_token = Some("ya29.token".into());
        config.inputs.twitter.bearer_token = Some("bearer".into());

        let registry = build_from_config(&config);
        assert_eq!(registry.list(), vec![EMAIL_SOURCE.to_string(), SOCIAL_SOURCE.to_string()]);
        assert!(registry.get(EMAIL_SOURCE).is_some());
    }

    #[test]
    fn disabled_source_not_registered() {
        let mut config = AppConfig::default();
        config.inputs.twitter.bearer_token = Some("bearer".into());
        config.inputs.twitter.enabled = false;

        assert!(build_from_config(&config).get(SOCIAL_SOURCE).is_none());
    }
}
