//! Outbound HTTP: client construction and retry of transient failures.
//!
//! Each integration carries its own `retry` section in the config file, so a
//! slow Brevo account can be given more patience than the Teams webhook.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

/// Seconds until Brevo's rate-limit window resets, sent with 429 responses.
const BREVO_RATE_LIMIT_RESET: &str = "x-sib-ratelimit-reset";

/// Retry settings stored under `<section>.retry` in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Upper bound on a server-requested wait (`Retry-After` or Brevo's reset).
    #[serde(default = "default_max_server_wait_secs")]
    pub max_server_wait_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_max_server_wait_secs() -> u64 {
    30
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_server_wait_secs: default_max_server_wait_secs(),
        }
    }
}

impl RetryPolicy {
    /// Doubling backoff after failed attempt `attempt` (1-based), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }

    /// Wait requested by the server, if any, capped at `max_server_wait_secs`.
    fn server_wait(&self, headers: &HeaderMap) -> Option<Duration> {
        [RETRY_AFTER.as_str(), BREVO_RATE_LIMIT_RESET]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| value.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.min(self.max_server_wait_secs)))
    }
}

/// Rate limiting, request timeout and server errors are worth another attempt.
pub fn is_transient(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Build a reqwest client whose every request is bounded by `timeout_secs`.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
}

/// Send `request`, retrying transient statuses, timeouts and refused
/// connections. `label` names the call in log lines ("brevo notes", ...).
///
/// Once attempts run out the last response is returned as-is, so callers still
/// map the final status to their own error.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
    label: &str,
) -> Result<reqwest::Response, reqwest::Error> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        // Streaming bodies cannot be replayed.
        let Some(cloned) = request.try_clone() else {
            return request.send().await;
        };

        let result = cloned.send().await;
        let retry = match &result {
            Ok(resp) if is_transient(resp.status()) => Some((
                format!("status {}", resp.status()),
                policy.server_wait(resp.headers()),
            )),
            Err(e) if e.is_timeout() || e.is_connect() => Some((e.to_string(), None)),
            _ => None,
        };

        match retry {
            Some((reason, requested)) if attempt < attempts => {
                let delay = requested.unwrap_or_else(|| policy.backoff(attempt));
                log::warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {:?}",
                    label,
                    attempt,
                    attempts,
                    reason,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Some((reason, _)) => {
                log::error!("{}: giving up after {} attempt(s) ({})", label, attempts, reason);
                return result;
            }
            None => return result,
        }
    }
}
