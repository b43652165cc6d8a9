//! Configuration types shared across the crate.

use serde::{Deserialize, Serialize};

use crate::crm::CrmConfig;
use crate::deliver::DeliveryConfig;
use crate::enrich::Lookups;
use crate::error::ReportError;
use crate::summarize::SummarizerConfig;
use crate::window::parse_timezone;

/// Top-level configuration, loaded from ~/.crmbrief/config.json.
///
/// Every section is optional; a missing file yields a config that only needs
/// credentials from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Serve CRM data from the embedded fixture instead of Brevo.
    #[serde(default)]
    pub use_mock_data: bool,
    /// IANA zone that decides "Monday" and renders timestamps.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub lookups: Lookups,
}

fn default_timezone() -> String {
    "America/Toronto".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_mock_data: false,
            timezone: default_timezone(),
            crm: CrmConfig::default(),
            summarizer: SummarizerConfig::default(),
            delivery: DeliveryConfig::default(),
            lookups: Lookups::default(),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

impl Config {
    /// Check everything a run needs before any network call is made.
    pub fn validate(&self) -> Result<(), ReportError> {
        parse_timezone(&self.timezone)?;

        if !self.use_mock_data && is_blank(&self.crm.api_key) {
            return Err(ReportError::ConfigurationError(
                "BREVO_API_KEY is required unless useMockData is enabled".to_string(),
            ));
        }
        if is_blank(&self.summarizer.api_key) {
            return Err(ReportError::ConfigurationError(
                "OPENAI_API_KEY is required".to_string(),
            ));
        }
        if !self.delivery.dry_run && is_blank(&self.delivery.webhook_url) {
            return Err(ReportError::ConfigurationError(
                "TEAMS_WEBHOOK_URL is required unless dryRun is enabled".to_string(),
            ));
        }
        if self.crm.automation_marker.trim().is_empty() {
            return Err(ReportError::ConfigurationError(
                "crm.automationMarker must not be empty".to_string(),
            ));
        }

        self.lookups.validate()
    }
}
