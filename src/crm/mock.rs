//! Mock CRM source for `useMockData` runs.
//!
//! The fixture is embedded at compile time. Its timestamps are offsets in hours
//! before the window end, so a mock run always has activity regardless of the
//! day it runs on. The same window filtering as the live client applies.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{Company, CrmError, CrmSource, RawDeal, RawNote};
use crate::window::ReportWindow;

const EMBEDDED_FIXTURE: &str = include_str!("../../fixtures/mock_data.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockFixture {
    #[serde(default)]
    notes: Vec<MockNote>,
    #[serde(default)]
    deals: Vec<MockDeal>,
    #[serde(default)]
    companies: Vec<Company>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockNote {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    company_ids: Vec<String>,
    #[serde(default)]
    contact_ids: Vec<String>,
    #[serde(default)]
    deal_ids: Vec<String>,
    hours_ago: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockDeal {
    id: String,
    name: String,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    pipeline_id: Option<String>,
    #[serde(default)]
    stage_id: Option<String>,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    yearly_spend_amount: f64,
    #[serde(default)]
    opportunity_type: Option<String>,
    #[serde(default)]
    distributor: Option<String>,
    #[serde(default)]
    company_ids: Vec<String>,
    #[serde(default)]
    created_hours_ago: Option<i64>,
    #[serde(default)]
    stage_updated_hours_ago: Option<i64>,
}

pub struct MockCrm {
    fixture: MockFixture,
    companies: HashMap<String, Company>,
}

impl MockCrm {
    /// Load the fixture bundled with the binary.
    pub fn embedded() -> Result<Self, CrmError> {
        Self::from_json(EMBEDDED_FIXTURE)
    }

    pub fn from_json(json: &str) -> Result<Self, CrmError> {
        let fixture: MockFixture = serde_json::from_str(json)
            .map_err(|e| CrmError::Mock(format!("invalid fixture: {}", e)))?;
        let companies = fixture
            .companies
            .iter()
            .map(|c| (c.id.clone(), c.clone()))
            .collect();
        log::info!(
            "Mock CRM loaded: {} notes, {} deals, {} companies",
            fixture.notes.len(),
            fixture.deals.len(),
            fixture.companies.len()
        );
        Ok(Self { fixture, companies })
    }
}

fn hours_before(end: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    end - Duration::hours(hours)
}

#[async_trait]
impl CrmSource for MockCrm {
    async fn fetch_notes(&self, window: &ReportWindow) -> Result<Vec<RawNote>, CrmError> {
        Ok(self
            .fixture
            .notes
            .iter()
            .map(|n| RawNote {
                id: n.id.clone(),
                text: n.text.clone(),
                author_id: n.author_id.clone(),
                created_at: hours_before(window.end, n.hours_ago),
                company_ids: n.company_ids.clone(),
                contact_ids: n.contact_ids.clone(),
                deal_ids: n.deal_ids.clone(),
            })
            .filter(|n| window.contains(n.created_at))
            .collect())
    }

    async fn fetch_deals(&self, window: &ReportWindow) -> Result<Vec<RawDeal>, CrmError> {
        Ok(self
            .fixture
            .deals
            .iter()
            .map(|d| {
                let created_at = d.created_hours_ago.map(|h| hours_before(window.end, h));
                let stage_updated_at = d
                    .stage_updated_hours_ago
                    .map(|h| hours_before(window.end, h));
                RawDeal {
                    id: d.id.clone(),
                    name: d.name.clone(),
                    owner_id: d.owner_id.clone(),
                    stage_id: d.stage_id.clone(),
                    pipeline_id: d.pipeline_id.clone(),
                    amount: d.amount,
                    yearly_spend_amount: d.yearly_spend_amount,
                    opportunity_type: d.opportunity_type.clone(),
                    distributor: d.distributor.clone(),
                    created_at,
                    stage_updated_at,
                    modified_at: stage_updated_at.or(created_at),
                    company_ids: d.company_ids.clone(),
                }
            })
            .filter(|d| {
                [d.created_at, d.stage_updated_at]
                    .into_iter()
                    .flatten()
                    .any(|ts| window.contains(ts))
            })
            .collect())
    }

    async fn fetch_company(&self, company_id: &str) -> Result<Option<Company>, CrmError> {
        let company = self.companies.get(company_id).cloned();
        if company.is_none() {
            log::warn!("Mock company {} not found", company_id);
        }
        Ok(company)
    }
}
