//! Error types for a report run
//!
//! Errors are classified by how the run recovers from them:
//! - SourceFailure: one CRM source is unusable, the report degrades to partial
//! - FatalFailure: no CRM source is usable, an error-summary report is sent
//! - SummarizerFailure: the affected part falls back to deterministic text
//! - DeliveryFailure: logged only, never surfaced to the caller
//! - ConfigurationError: aborts before any network call

use std::fmt;

use thiserror::Error;

/// The two data sources a report is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Notes,
    Deals,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Notes => "notes",
            Source::Deals => "deals",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single source that could not be acquired, with the upstream cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: Source,
    pub cause: String,
}

impl SourceFailure {
    pub fn new(source: Source, cause: impl Into<String>) -> Self {
        Self {
            source,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to fetch {}: {}", self.source, self.cause)
    }
}

/// Every source failed; there is nothing to summarize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalFailure {
    pub failures: Vec<SourceFailure>,
}

impl FatalFailure {
    /// One human-readable line per failed source.
    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.to_string()).collect()
    }
}

impl fmt::Display for FatalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All CRM sources failed: {}", self.messages().join("; "))
    }
}

/// Error types for a report run
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("{0}")]
    SourceFailure(SourceFailure),

    #[error("{0}")]
    FatalFailure(FatalFailure),

    #[error("Summarizer failed: {0}")]
    SummarizerFailure(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),
}

impl ReportError {
    /// Returns true if a later run (or a retry) may succeed without any change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReportError::SourceFailure(_)
                | ReportError::SummarizerFailure(_)
                | ReportError::DeliveryFailure(_)
        )
    }

    /// Get an operator-facing recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ReportError::ConfigurationError(_) => {
                "Check ~/.crmbrief/config.json and the BREVO_API_KEY / OPENAI_API_KEY / TEAMS_WEBHOOK_URL variables."
            }
            ReportError::SourceFailure(_) => "Check the Brevo API status and key permissions.",
            ReportError::FatalFailure(_) => {
                "No CRM data could be fetched. Check the Brevo API key and network access."
            }
            ReportError::SummarizerFailure(_) => "Check the OpenAI API key, model name and quota.",
            ReportError::DeliveryFailure(_) => "Check that the Teams webhook URL is still valid.",
        }
    }
}

impl From<SourceFailure> for ReportError {
    fn from(failure: SourceFailure) -> Self {
        ReportError::SourceFailure(failure)
    }
}

impl From<FatalFailure> for ReportError {
    fn from(failure: FatalFailure) -> Self {
        ReportError::FatalFailure(failure)
    }
}
