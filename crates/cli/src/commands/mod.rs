//! Command handlers and the pieces they share.

pub mod serve;
pub mod summary;
pub mod tweets;

use std::path::PathBuf;
use std::time::Duration;

use decentra_config::AppConfig;
use decentra_engine::SummaryReport;
use decentra_server::ErrorResponse;
use serde::Serialize;
use tracing::debug;

/// Timeout for forwarded requests.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Older name for `DECENTRA_API_URL`, still honored when the new one is unset.
pub const LEGACY_API_URL_ENV: &str = "DECEN_API_URL";

/// The `--api-url` value, else the legacy environment variable.
pub fn api_url_or_legacy(
    api_url: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    api_url.or_else(|| lookup(LEGACY_API_URL_ENV))
}

/// Options that apply to every command.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub api_url: Option<String>,
}

impl GlobalOptions {
    pub fn load_config(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        let config = match &self.config {
            Some(path) => AppConfig::load_with_env(path),
            None => AppConfig::load(),
        };
        Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
    }

    /// Server to forward to: the flag, then the configured URL.
    pub fn remote_url(&self, config: &AppConfig) -> Option<String> {
        self.api_url
            .clone()
            .or_else(|| config.api_url.clone())
            .filter(|url| !url.trim().is_empty())
    }
}

/// POST a summary request to a running server.
pub async fn forward<B: Serialize>(
    api_url: &str,
    path: &str,
    body: &B,
) -> Result<SummaryReport, Box<dyn std::error::Error>> {
    let url = format!("{}{}", api_url.trim_end_matches('/'), path);
    debug!(url = %url, "Forwarding request");

    let client = reqwest::Client::builder()
        .timeout(REMOTE_TIMEOUT)
        .build()?;
    let resp = client.post(&url).json(body).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        return Err(format!("Server returned {status}: {message}").into());
    }

    Ok(resp.json().await?)
}

/// Print the summary to stdout and any degradation to stderr.
pub fn print_report(report: &SummaryReport) {
    println!("{}", report.summary);
    if let Some(ref degraded) = report.degraded {
        eprintln!();
        eprintln!(
            "  note: no content from '{}' ({})",
            degraded.source(),
            serde_json::to_string(degraded).unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_configured_url() {
        let config = AppConfig {
            api_url: Some("http://configured:8080".into()),
            ..AppConfig::default()
        };
        let globals = GlobalOptions {
            config: None,
            api_url: Some("http://flag:9000".into()),
        };
        assert_eq!(globals.remote_url(&config).as_deref(), Some("http://flag:9000"));

        let globals = GlobalOptions {
            config: None,
            api_url: None,
        };
        assert_eq!(
            globals.remote_url(&config).as_deref(),
            Some("http://configured:8080")
        );
    }

    #[test]
    fn legacy_env_fills_missing_api_url() {
        let env = |key: &str| (key == "DECEN_API_URL").then(|| "http://legacy:8000".to_string());

        assert_eq!(
            api_url_or_legacy(None, env).as_deref(),
            Some("http://legacy:8000")
        );
        assert_eq!(
            api_url_or_legacy(Some("http://flag:9000".into()), env).as_deref(),
            Some("http://flag:9000")
        );
        assert_eq!(api_url_or_legacy(None, |_| None), None);
    }

    #[test]
    fn blank_url_runs_locally() {
        let globals = GlobalOptions {
            config: None,
            api_url: Some("  ".into()),
        };
        assert_eq!(globals.remote_url(&AppConfig::default()), None);
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9911\n").unwrap();

        let globals = GlobalOptions {
            config: Some(path),
            api_url: None,
        };
        let config = globals.load_config().unwrap();
        assert_eq!(config.server.port, 9911);
    }
}
