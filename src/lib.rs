//! crmbrief: daily executive summary of Brevo CRM activity, posted to Teams.

pub mod acquire;
pub mod classify;
pub mod config;
pub mod crm;
pub mod degrade;
pub mod deliver;
pub mod enrich;
pub mod error;
pub mod http;
pub mod report;
pub mod summarize;
pub mod types;
pub mod window;

use report::RunOutcome;

/// Perform one report run for the current time.
pub async fn run() -> RunOutcome {
    report::run(config::load_config(), chrono::Utc::now()).await
}
