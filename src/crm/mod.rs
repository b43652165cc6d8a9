//! Brevo CRM integration.
//!
//! Pulls notes, deals and company details. The rest of the crate only sees the
//! `CrmSource` trait, implemented by the live HTTP client (`client`) and by an
//! embedded fixture for mock runs (`mock`).

pub mod client;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::RetryPolicy;
use crate::window::ReportWindow;

/// Suffix Brevo's Aura assistant appends to the notes it writes.
pub const DEFAULT_AUTOMATION_MARKER: &str = "Generated automatically by Aura";

/// CRM configuration stored under `crm` in ~/.crmbrief/config.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_records")]
    pub max_records: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_company_timeout_secs")]
    pub company_timeout_secs: u64,
    #[serde(default = "default_company_concurrency")]
    pub company_concurrency: usize,
    #[serde(default = "default_automation_marker")]
    pub automation_marker: String,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.brevo.com".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_max_records() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_company_timeout_secs() -> u64 {
    60
}

fn default_company_concurrency() -> usize {
    4
}

fn default_automation_marker() -> String {
    DEFAULT_AUTOMATION_MARKER.to_string()
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            page_size: default_page_size(),
            max_records: default_max_records(),
            request_timeout_secs: default_request_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            company_timeout_secs: default_company_timeout_secs(),
            company_concurrency: default_company_concurrency(),
            automation_marker: default_automation_marker(),
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A note as returned by the notes endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNote {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub company_ids: Vec<String>,
    pub contact_ids: Vec<String>,
    pub deal_ids: Vec<String>,
}

/// A deal as returned by the deals endpoint, flattened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeal {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub stage_id: Option<String>,
    pub pipeline_id: Option<String>,
    pub amount: f64,
    pub yearly_spend_amount: f64,
    pub opportunity_type: Option<String>,
    pub distributor: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub stage_updated_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub company_ids: Vec<String>,
}

/// Company attributes used to enrich notes and deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub distributor: Option<String>,
    #[serde(default)]
    pub business_division: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from CRM operations.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Brevo API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),
    #[error("Mock data error: {0}")]
    Mock(String),
    #[error("No API key configured for Brevo")]
    NoApiKey,
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Anything that can answer the three CRM queries a run needs.
#[async_trait]
pub trait CrmSource: Send + Sync {
    /// Notes created inside `window`, unfiltered by link type.
    async fn fetch_notes(&self, window: &ReportWindow) -> Result<Vec<RawNote>, CrmError>;

    /// Deals created, modified or stage-updated inside `window`.
    async fn fetch_deals(&self, window: &ReportWindow) -> Result<Vec<RawDeal>, CrmError>;

    /// Company details, or `None` when the id is unknown upstream.
    async fn fetch_company(&self, company_id: &str) -> Result<Option<Company>, CrmError>;
}

/// Parse a CRM timestamp into UTC.
///
/// Accepts RFC 3339 (`Z` or numeric offset) and naive ISO-8601, which is
/// taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CrmError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(CrmError::InvalidTimestamp(raw.to_string()))
}
