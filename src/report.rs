//! One end-to-end report run.
//!
//! window → acquire → degrade → summarize → deliver. Every failure mode ends in
//! an outcome; the worst case is an error-summary message to the channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use uuid::Uuid;

use crate::acquire::{acquire, AcquireOptions};
use crate::crm::client::BrevoClient;
use crate::crm::mock::MockCrm;
use crate::crm::CrmSource;
use crate::degrade::{build_payload, ReportPayload};
use crate::deliver::{build_delivery, Delivery};
use crate::error::ReportError;
use crate::summarize::client::OpenAiClient;
use crate::summarize::prompts;
use crate::summarize::Summarizer;
use crate::config::LoadFailure;
use crate::types::Config;
use crate::window::{parse_timezone, report_title, resolve_window, ReportWindow};

pub const SINGLE_PART_TITLE: &str = "CRM Daily Executive Summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    Notes,
    Deals,
}

impl PartKind {
    fn title(self) -> &'static str {
        match self {
            PartKind::Notes => "CRM Daily Executive Summary (1/2)",
            PartKind::Deals => "CRM Daily Executive Summary (2/2)",
        }
    }

    fn label(self) -> &'static str {
        match self {
            PartKind::Notes => "notes",
            PartKind::Deals => "deals",
        }
    }
}

/// One message sent to the delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPart {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub run_id: String,
    pub window: Option<ReportWindow>,
    pub parts_delivered: usize,
    pub errors: Vec<String>,
}

impl RunOutcome {
    fn new(run_id: &str, window: Option<ReportWindow>) -> Self {
        Self {
            run_id: run_id.to_string(),
            window,
            parts_delivered: 0,
            errors: Vec::new(),
        }
    }

    /// Non-zero only when nothing reached the channel.
    pub fn exit_code(&self) -> i32 {
        if self.parts_delivered > 0 {
            0
        } else {
            1
        }
    }
}

/// The three external seams a run talks to.
pub struct Services {
    pub crm: Arc<dyn CrmSource>,
    pub summarizer: Arc<dyn Summarizer>,
    pub delivery: Arc<dyn Delivery>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self, ReportError> {
        let crm: Arc<dyn CrmSource> = if config.use_mock_data {
            log::info!("Using embedded mock CRM data");
            Arc::new(MockCrm::embedded().map_err(|e| {
                ReportError::ConfigurationError(e.to_string())
            })?)
        } else {
            Arc::new(BrevoClient::new(&config.crm).map_err(|e| {
                ReportError::ConfigurationError(e.to_string())
            })?)
        };
        let summarizer = OpenAiClient::new(&config.summarizer)
            .map_err(|e| ReportError::ConfigurationError(e.to_string()))?;
        let delivery = build_delivery(&config.delivery)
            .map_err(|e| ReportError::ConfigurationError(e.to_string()))?;
        Ok(Self {
            crm,
            summarizer: Arc::new(summarizer),
            delivery,
        })
    }
}

/// Summarize one part, falling back to deterministic text on failure.
/// Returns the body and, on failure, the error line for the outcome.
async fn summarize_part(
    summarizer: &dyn Summarizer,
    kind: PartKind,
    title: &str,
    prompt: Option<String>,
) -> Option<(String, Option<String>)> {
    let prompt = prompt?;
    log::info!("Generating {} summary", kind.label());
    match summarizer.complete(prompts::SYSTEM_PROMPT, &prompt).await {
        Ok(body) => Some((body, None)),
        Err(e) => {
            let err = ReportError::SummarizerFailure(format!("{} part: {}", kind.label(), e));
            log::error!("{}", err);
            Some((
                prompts::summarizer_failure(title, kind.label(), &e.to_string()),
                Some(err.to_string()),
            ))
        }
    }
}

/// Turn a payload into report parts, in delivery order (deals before notes).
async fn compose_parts(
    payload: &ReportPayload,
    summarizer: &dyn Summarizer,
    title: &str,
    tz: Tz,
    errors: &mut Vec<String>,
) -> Vec<ReportPart> {
    if payload.has_no_activity() {
        log::info!("No CRM activity found, sending empty report");
        return vec![ReportPart {
            title: SINGLE_PART_TITLE.to_string(),
            body: prompts::empty_report(title, &payload.error_notices),
        }];
    }

    let notes_prompt = payload
        .notes
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(|n| prompts::notes_prompt(title, n, tz));
    let deals_prompt = payload
        .deals
        .as_ref()
        .filter(|d| !d.is_empty())
        .map(|d| prompts::deals_prompt(title, d, tz));

    let (notes, deals) = tokio::join!(
        summarize_part(summarizer, PartKind::Notes, title, notes_prompt),
        summarize_part(summarizer, PartKind::Deals, title, deals_prompt),
    );

    let banner = if payload.is_partial() {
        log::warn!("Generating partial report due to source errors");
        prompts::partial_banner(&payload.error_notices)
    } else {
        String::new()
    };

    let mut parts = Vec::new();
    for (kind, summary) in [(PartKind::Deals, deals), (PartKind::Notes, notes)] {
        if let Some((body, error)) = summary {
            errors.extend(error);
            parts.push(ReportPart {
                title: kind.title().to_string(),
                body: format!("{}{}", banner, body),
            });
        }
    }
    parts
}

/// Send parts in order. The first failure stops delivery and triggers one
/// error notification attempt. Returns how many parts were accepted.
async fn deliver_parts(
    delivery: &dyn Delivery,
    parts: &[ReportPart],
    errors: &mut Vec<String>,
) -> usize {
    let mut delivered = 0;
    for part in parts {
        if let Err(e) = delivery.send_report(&part.title, &part.body).await {
            let err = ReportError::DeliveryFailure(e.to_string());
            log::error!("{}", err);
            errors.push(err.to_string());
            if let Err(notify) = delivery
                .send_error_notification("Failed to send daily CRM report", Some(&err.to_string()))
                .await
            {
                log::error!("Failed to send error notification: {}", notify);
            }
            return delivered;
        }
        delivered += 1;
    }
    log::info!("Report delivered ({} part(s))", delivered);
    delivered
}

/// Execute one run against already-built services.
pub async fn execute(config: &Config, services: &Services, now: DateTime<Utc>) -> RunOutcome {
    let run_id = Uuid::new_v4().to_string();
    log::info!("Run {} started", run_id);

    let prepared = parse_timezone(&config.timezone).and_then(|tz| {
        let window = resolve_window(now, &config.timezone)?;
        let title = report_title(now, &config.timezone)?;
        Ok((tz, window, title))
    });
    let (tz, window, title) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            let mut outcome = RunOutcome::new(&run_id, None);
            send_error_summary(Some(services.delivery.as_ref()), &e, now, &mut outcome).await;
            return finish(outcome);
        }
    };

    let mut outcome = RunOutcome::new(&run_id, Some(window));
    let options = AcquireOptions::from_config(&config.crm);
    let result = acquire(Arc::clone(&services.crm), &window, &config.lookups, &options).await;
    if !result.failed_companies.is_empty() {
        log::warn!(
            "{} company lookup(s) failed; shown as placeholders",
            result.failed_companies.len()
        );
    }

    let parts = match build_payload(result) {
        Ok(payload) => {
            log::info!(
                "Payload ready: {} note(s), {} deal(s), {} failed source(s)",
                payload.note_count(),
                payload.deal_count(),
                payload.error_notices.len()
            );
            outcome.errors.extend(payload.error_notices.iter().cloned());
            compose_parts(
                &payload,
                services.summarizer.as_ref(),
                &title,
                tz,
                &mut outcome.errors,
            )
            .await
        }
        Err(fatal) => {
            let messages = fatal.messages();
            let err = ReportError::from(fatal);
            log_failure(&err);
            outcome.errors.extend(messages.iter().cloned());
            vec![ReportPart {
                title: SINGLE_PART_TITLE.to_string(),
                body: prompts::error_summary(&title, &messages),
            }]
        }
    };

    outcome.parts_delivered =
        deliver_parts(services.delivery.as_ref(), &parts, &mut outcome.errors).await;
    finish(outcome)
}

/// Deliver an error summary for a run that could not start.
async fn send_error_summary(
    delivery: Option<&dyn Delivery>,
    error: &ReportError,
    now: DateTime<Utc>,
    outcome: &mut RunOutcome,
) {
    log_failure(error);
    outcome.errors.push(error.to_string());

    let Some(delivery) = delivery else {
        log::error!("No delivery channel available; error summary not sent");
        return;
    };
    let title = report_title(now, "UTC").unwrap_or_else(|_| SINGLE_PART_TITLE.to_string());
    let part = ReportPart {
        title: SINGLE_PART_TITLE.to_string(),
        body: prompts::error_summary(
            &title,
            &[error.to_string(), error.recovery_suggestion().to_string()],
        ),
    };
    outcome.parts_delivered = deliver_parts(delivery, &[part], &mut outcome.errors).await;
}

fn log_failure(error: &ReportError) {
    let next = if error.is_retryable() {
        "may clear on the next run"
    } else {
        "needs operator action"
    };
    log::error!("{} ({} This {}.)", error, error.recovery_suggestion(), next);
}

fn finish(outcome: RunOutcome) -> RunOutcome {
    if outcome.errors.is_empty() {
        log::info!(
            "Run {} completed: {} part(s) delivered",
            outcome.run_id,
            outcome.parts_delivered
        );
    } else {
        log::warn!(
            "Run {} completed with {} error(s): {}",
            outcome.run_id,
            outcome.errors.len(),
            outcome.errors.join("; ")
        );
    }
    outcome
}

/// Validate and execute. A configuration error still produces an
/// error-summary message when a delivery channel can be built, from the
/// fallback config if the real one could not be loaded.
pub async fn run(config: Result<Config, LoadFailure>, now: DateTime<Utc>) -> RunOutcome {
    let config = match config {
        Ok(config) => config,
        Err(failure) => return configuration_failure(&failure.fallback, &failure.error, now).await,
    };

    let services = config
        .validate()
        .and_then(|_| Services::from_config(&config));
    match services {
        Ok(services) => execute(&config, &services, now).await,
        Err(e) => configuration_failure(&config, &e, now).await,
    }
}

async fn configuration_failure(
    config: &Config,
    error: &ReportError,
    now: DateTime<Utc>,
) -> RunOutcome {
    let mut outcome = RunOutcome::new(&Uuid::new_v4().to_string(), None);
    let delivery = match build_delivery(&config.delivery) {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            log::warn!("Cannot build delivery channel for error summary: {}", e);
            None
        }
    };
    send_error_summary(delivery.as_deref(), error, now, &mut outcome).await;
    finish(outcome)
}
