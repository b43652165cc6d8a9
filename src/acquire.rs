//! Acquisition: fetch notes, deals and the companies they reference.
//!
//! Notes and deals are fetched concurrently and independently; a failure in
//! one never cancels the other. Company lookups fan out over a bounded
//! `JoinSet` once both sources have settled. Every fetch runs under a timeout.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::classify::{classify_deals, classify_notes, ClassifiedDeals, QualifiedNote};
use crate::crm::{Company, CrmConfig, CrmError, CrmSource};
use crate::enrich::{enrich_deals, enrich_notes, CompanyDirectory, EnrichedDeals, EnrichedNote, Lookups};
use crate::error::{ReportError, Source, SourceFailure};
use crate::window::ReportWindow;

/// Knobs for one acquisition, derived from `CrmConfig`.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub automation_marker: String,
    pub fetch_timeout: Duration,
    pub company_timeout: Duration,
    pub company_concurrency: usize,
}

impl AcquireOptions {
    pub fn from_config(config: &CrmConfig) -> Self {
        Self {
            automation_marker: config.automation_marker.clone(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            company_timeout: Duration::from_secs(config.company_timeout_secs),
            company_concurrency: config.company_concurrency.max(1),
        }
    }
}

/// Per-source outcome of one acquisition. Each field is independent.
#[derive(Debug)]
pub struct AcquisitionResult {
    pub notes: Result<Vec<EnrichedNote>, SourceFailure>,
    pub deals: Result<EnrichedDeals, SourceFailure>,
    /// Company ids whose lookup errored or timed out. Informational only;
    /// affected records already carry a placeholder company.
    pub failed_companies: BTreeSet<String>,
}

/// Run a fetch under `limit`, folding both the error and the timeout into a
/// `SourceFailure` for `source`.
async fn bounded<T, F>(source: Source, limit: Duration, fetch: F) -> Result<T, SourceFailure>
where
    F: Future<Output = Result<T, CrmError>>,
{
    match tokio::time::timeout(limit, fetch).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SourceFailure::new(source, e.to_string())),
        Err(_) => Err(SourceFailure::new(
            source,
            format!("timed out after {}s", limit.as_secs()),
        )),
    }
}

pub async fn acquire(
    source: Arc<dyn CrmSource>,
    window: &ReportWindow,
    lookups: &Lookups,
    options: &AcquireOptions,
) -> AcquisitionResult {
    let (raw_notes, raw_deals) = tokio::join!(
        bounded(Source::Notes, options.fetch_timeout, source.fetch_notes(window)),
        bounded(Source::Deals, options.fetch_timeout, source.fetch_deals(window)),
    );

    let notes: Result<Vec<QualifiedNote>, SourceFailure> = raw_notes.map(|raw| {
        let fetched = raw.len();
        let qualified = classify_notes(raw, &options.automation_marker);
        log::info!(
            "Notes source: OK ({} qualified of {} fetched)",
            qualified.len(),
            fetched
        );
        qualified
    });
    if let Err(failure) = &notes {
        log_failure(failure);
    }

    let deals: Result<ClassifiedDeals, SourceFailure> = raw_deals.map(|raw| {
        let fetched = raw.len();
        let classified = classify_deals(raw, window);
        log::info!(
            "Deals source: OK ({} new, {} updated of {} fetched)",
            classified.new.len(),
            classified.updated.len(),
            fetched
        );
        classified
    });
    if let Err(failure) = &deals {
        log_failure(failure);
    }

    let company_ids = referenced_companies(notes.as_ref().ok(), deals.as_ref().ok());
    let directory = fetch_companies(source, company_ids, options).await;

    AcquisitionResult {
        notes: notes.map(|n| enrich_notes(n, lookups, &directory)),
        deals: deals.map(|d| enrich_deals(d, lookups, &directory)),
        failed_companies: directory.failed,
    }
}

fn log_failure(failure: &SourceFailure) {
    let err = ReportError::from(failure.clone());
    log::warn!(
        "{} source: FAILED ({}). {}",
        failure.source,
        failure.cause,
        err.recovery_suggestion()
    );
}

/// Unique company ids across the surviving notes and deals.
fn referenced_companies(
    notes: Option<&Vec<QualifiedNote>>,
    deals: Option<&ClassifiedDeals>,
) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    if let Some(notes) = notes {
        ids.extend(notes.iter().flat_map(|n| n.company_ids.iter().cloned()));
    }
    if let Some(deals) = deals {
        ids.extend(
            deals
                .new
                .iter()
                .chain(deals.updated.iter())
                .flat_map(|d| d.deal.company_ids.iter().cloned()),
        );
    }
    ids
}

enum CompanyLookup {
    Found(Company),
    NotFound,
    Failed(String),
}

async fn fetch_companies(
    source: Arc<dyn CrmSource>,
    ids: BTreeSet<String>,
    options: &AcquireOptions,
) -> CompanyDirectory {
    let mut directory = CompanyDirectory::default();
    if ids.is_empty() {
        return directory;
    }

    let requested = ids.len();
    let semaphore = Arc::new(Semaphore::new(options.company_concurrency));
    let mut tasks = JoinSet::new();

    for id in ids.iter().cloned() {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let limit = options.company_timeout;
        tasks.spawn(async move {
            // Never closed; a failed acquire just runs unpermitted.
            let _permit = semaphore.acquire_owned().await.ok();
            let lookup = match tokio::time::timeout(limit, source.fetch_company(&id)).await {
                Ok(Ok(Some(company))) => CompanyLookup::Found(company),
                Ok(Ok(None)) => CompanyLookup::NotFound,
                Ok(Err(e)) => CompanyLookup::Failed(e.to_string()),
                Err(_) => CompanyLookup::Failed(format!("timed out after {}s", limit.as_secs())),
            };
            (id, lookup)
        });
    }

    let mut not_found = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, CompanyLookup::Found(company))) => {
                directory.found.insert(id, company);
            }
            Ok((id, CompanyLookup::NotFound)) => {
                log::warn!("Company {} not found in CRM", id);
                not_found.insert(id);
            }
            Ok((id, CompanyLookup::Failed(cause))) => {
                log::warn!("Company lookup failed for {}: {}", id, cause);
                directory.failed.insert(id);
            }
            Err(e) => log::error!("Company lookup task aborted: {}", e),
        }
    }

    // Ids lost to an aborted task count as failed.
    for id in ids {
        if !directory.found.contains_key(&id) && !not_found.contains(&id) {
            directory.failed.insert(id);
        }
    }

    log::info!(
        "Company lookups: {} requested, {} resolved, {} not found, {} failed",
        requested,
        directory.found.len(),
        not_found.len(),
        directory.failed.len()
    );
    directory
}
