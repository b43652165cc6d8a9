use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Summarizer, SummarizerConfig, SummarizerError};
use crate::http::{build_client, send_with_retry, RetryPolicy};

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_completion_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizerError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(SummarizerError::NoApiKey)?;
        log::info!("Summarizer client initialized (model={})", config.model);
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            endpoint: format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            max_completion_tokens: config.max_completion_tokens,
            temperature: config.effective_temperature(),
            retry: config.retry.clone(),
        })
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_completion_tokens": self.max_completion_tokens,
            "temperature": self.temperature,
        })
    }
}

/// Pull the first choice's message content out of a completions response.
fn extract_content(body: &Value) -> Result<String, SummarizerError> {
    if let Some(total) = body.pointer("/usage/total_tokens").and_then(Value::as_u64) {
        log::debug!("Summarizer tokens used: {}", total);
    }
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(SummarizerError::EmptyResponse)
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, SummarizerError> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system, user));

        let resp = send_with_retry(request, &self.retry, &format!("summarizer {}", self.model)).await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SummarizerError::Api { status, message });
        }

        let body: Value = resp.json().await?;
        let content = extract_content(&body)?;
        log::info!("Summary generated ({} characters)", content.len());
        Ok(content)
    }
}
