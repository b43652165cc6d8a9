//! Delivery channels for finished reports.
//!
//! The live channel is a Microsoft Teams incoming webhook that receives one
//! Adaptive Card per report part. Dry runs print to stdout instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::http::{build_client, send_with_retry, RetryPolicy};

/// Delivery configuration stored under `delivery` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Print reports instead of posting them.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            dry_run: false,
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("No Teams webhook URL configured")]
    NoWebhook,
}

#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_report(&self, title: &str, body: &str) -> Result<(), DeliveryError>;

    async fn send_error_notification(
        &self,
        message: &str,
        context: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// Pick the channel for this run: console when `dry_run`, Teams otherwise.
pub fn build_delivery(config: &DeliveryConfig) -> Result<Arc<dyn Delivery>, DeliveryError> {
    if config.dry_run {
        log::info!("Delivery: dry run, reports go to stdout");
        return Ok(Arc::new(ConsoleDelivery));
    }
    Ok(Arc::new(TeamsWebhook::new(config)?))
}

pub fn error_notification_text(message: &str, context: Option<&str>) -> String {
    let mut text = format!("⚠️ **CRM Automation Error**\n\n{}", message);
    if let Some(context) = context {
        text.push_str(&format!("\n\n**Context:** {}", context));
    }
    text.push_str("\n\nPlease check the run logs for more details.");
    text
}

pub struct TeamsWebhook {
    client: reqwest::Client,
    webhook_url: String,
    retry: RetryPolicy,
}

impl TeamsWebhook {
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let webhook_url = config
            .webhook_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or(DeliveryError::NoWebhook)?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            webhook_url,
            retry: config.retry.clone(),
        })
    }

    async fn post(&self, payload: &Value) -> Result<(), DeliveryError> {
        let request = self.client.post(&self.webhook_url).json(payload);
        let resp = send_with_retry(request, &self.retry, "teams webhook").await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        log::info!("Teams accepted message (status {})", status.as_u16());
        Ok(())
    }
}

/// Minimal Adaptive Card: a bold title block and a wrapped markdown body.
pub fn adaptive_card(title: &str, body: &str) -> Value {
    json!({
        "type": "message",
        "attachments": [{
            "contentType": "application/vnd.microsoft.card.adaptive",
            "contentUrl": null,
            "content": {
                "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                "type": "AdaptiveCard",
                "version": "1.4",
                "body": [
                    {
                        "type": "TextBlock",
                        "text": title,
                        "weight": "Bolder",
                        "size": "Large",
                        "wrap": true
                    },
                    {
                        "type": "TextBlock",
                        "text": body,
                        "wrap": true
                    }
                ]
            }
        }]
    })
}

#[async_trait]
impl Delivery for TeamsWebhook {
    async fn send_report(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        log::info!("Sending report to Teams: {}", title);
        self.post(&adaptive_card(title, body)).await
    }

    async fn send_error_notification(
        &self,
        message: &str,
        context: Option<&str>,
    ) -> Result<(), DeliveryError> {
        log::info!("Sending error notification to Teams");
        self.post(&json!({ "text": error_notification_text(message, context) }))
            .await
    }
}

pub struct ConsoleDelivery;

#[async_trait]
impl Delivery for ConsoleDelivery {
    async fn send_report(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        println!("==== {} ====\n{}\n", title, body);
        Ok(())
    }

    async fn send_error_notification(
        &self,
        message: &str,
        context: Option<&str>,
    ) -> Result<(), DeliveryError> {
        println!("{}\n", error_notification_text(message, context));
        Ok(())
    }
}
