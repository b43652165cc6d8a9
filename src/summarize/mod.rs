//! Summarizer integration.
//!
//! The language model is an opaque text generator behind `Summarizer`. Prompt
//! construction and the deterministic fallback reports live in `prompts`; the
//! OpenAI-compatible HTTP client lives in `client`.

pub mod client;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::RetryPolicy;

/// Summarizer configuration stored under `summarizer` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
    /// Ignored for gpt-5 models, which only accept 1.0.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-5".to_string()
}

fn default_max_completion_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_timeout_secs() -> u64 {
    180
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            max_completion_tokens: default_max_completion_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

impl SummarizerConfig {
    /// Temperature actually sent for the configured model.
    pub fn effective_temperature(&self) -> f32 {
        if self.model.starts_with("gpt-5") {
            1.0
        } else {
            self.temperature
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Summarizer API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Summarizer returned no content")]
    EmptyResponse,
    #[error("No API key configured for the summarizer")]
    NoApiKey,
}

/// Turns a system prompt plus a user prompt into report text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, SummarizerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt5_forces_unit_temperature() {
        let config = SummarizerConfig::default();
        assert_eq!(config.effective_temperature(), 1.0);
    }

    #[test]
    fn other_models_use_configured_temperature() {
        let config = SummarizerConfig {
            model: "gpt-4o".to_string(),
            ..Default::default()
        };
        assert!((config.effective_temperature() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SummarizerConfig =
            serde_json::from_str(r#"{ "model": "gpt-4o-mini" }"#).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_completion_tokens, 4000);
        assert_eq!(config.base_url, "https://api.openai.com");
    }
}
