//! Exponential backoff policy for transient backend failures.

use std::time::Duration;

use decentra_config::ModelGatewayConfig;

/// How long and how often the gateway retries transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (`max_retries + 1` attempts in total)
    pub max_retries: u32,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied after each retry
    pub backoff_factor: f64,
    /// Upper bound on a single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ModelGatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::try_from_secs_f64(config.initial_delay_secs)
                .unwrap_or(Duration::from_secs(1)),
            backoff_factor: config.backoff_factor,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based):
    /// `initial_delay * backoff_factor^(retry - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
