//! Enrichment: human-readable labels for owners, pipelines, stages and
//! companies.
//!
//! Lookup tables are injected through `Lookups` (part of the config file).
//! Enrichment is best-effort. An unmapped id falls back to the raw id, a
//! missing id to `"Unknown"`, and a company that could not be fetched to an
//! `"Unknown Company"` placeholder.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::{ClassifiedDeal, ClassifiedDeals, DealClass, QualifiedNote};
use crate::crm::{Company, RawDeal};
use crate::error::ReportError;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const UNKNOWN_COMPANY: &str = "Unknown Company";

/// Display names for one pipeline and its stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMapping {
    pub name: String,
    #[serde(default)]
    pub stages: BTreeMap<String, String>,
}

/// Static id → display name tables, stored under `lookups` in the config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookups {
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineMapping>,
    #[serde(default)]
    pub owners: BTreeMap<String, String>,
}

impl Lookups {
    pub fn owner_name(&self, owner_id: Option<&str>) -> String {
        match owner_id {
            Some(id) => self.owners.get(id).cloned().unwrap_or_else(|| id.to_string()),
            None => UNKNOWN_LABEL.to_string(),
        }
    }

    pub fn pipeline_name(&self, pipeline_id: Option<&str>) -> String {
        match pipeline_id {
            Some(id) => self
                .pipelines
                .get(id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| id.to_string()),
            None => UNKNOWN_LABEL.to_string(),
        }
    }

    /// Stage ids are only unique within their pipeline.
    pub fn stage_name(&self, pipeline_id: Option<&str>, stage_id: Option<&str>) -> String {
        match stage_id {
            Some(stage) => pipeline_id
                .and_then(|p| self.pipelines.get(p))
                .and_then(|p| p.stages.get(stage))
                .cloned()
                .unwrap_or_else(|| stage.to_string()),
            None => UNKNOWN_LABEL.to_string(),
        }
    }

    /// Reject tables that would render blank labels.
    pub fn validate(&self) -> Result<(), ReportError> {
        for (id, name) in &self.owners {
            if name.trim().is_empty() {
                return Err(ReportError::ConfigurationError(format!(
                    "Owner mapping for '{}' has an empty display name",
                    id
                )));
            }
        }
        for (id, pipeline) in &self.pipelines {
            if pipeline.name.trim().is_empty() {
                return Err(ReportError::ConfigurationError(format!(
                    "Pipeline mapping for '{}' has an empty name",
                    id
                )));
            }
            for (stage_id, stage_name) in &pipeline.stages {
                if stage_name.trim().is_empty() {
                    return Err(ReportError::ConfigurationError(format!(
                        "Stage mapping '{}' in pipeline '{}' has an empty name",
                        stage_id, id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Companies fetched for this run, plus the ids whose lookup failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyDirectory {
    pub found: BTreeMap<String, Company>,
    pub failed: BTreeSet<String>,
}

impl CompanyDirectory {
    pub fn resolve(&self, company_id: &str) -> Company {
        self.found
            .get(company_id)
            .cloned()
            .unwrap_or_else(|| placeholder_company(company_id))
    }

    fn resolve_all(&self, ids: &[String]) -> Vec<Company> {
        ids.iter().map(|id| self.resolve(id)).collect()
    }
}

pub fn placeholder_company(company_id: &str) -> Company {
    Company {
        id: company_id.to_string(),
        name: UNKNOWN_COMPANY.to_string(),
        distributor: None,
        business_division: None,
        industry: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedNote {
    pub note: QualifiedNote,
    pub author_name: String,
    pub companies: Vec<Company>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedDeal {
    pub class: DealClass,
    pub deal: RawDeal,
    pub owner_name: String,
    pub pipeline_name: String,
    pub stage_name: String,
    pub companies: Vec<Company>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedDeals {
    pub new: Vec<EnrichedDeal>,
    pub updated: Vec<EnrichedDeal>,
}

impl EnrichedDeals {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.updated.len()
    }
}

pub fn enrich_notes(
    notes: Vec<QualifiedNote>,
    lookups: &Lookups,
    companies: &CompanyDirectory,
) -> Vec<EnrichedNote> {
    notes
        .into_iter()
        .map(|note| EnrichedNote {
            author_name: lookups.owner_name(note.author_id.as_deref()),
            companies: companies.resolve_all(&note.company_ids),
            note,
        })
        .collect()
}

fn enrich_deal(
    classified: ClassifiedDeal,
    lookups: &Lookups,
    companies: &CompanyDirectory,
) -> EnrichedDeal {
    let deal = classified.deal;
    EnrichedDeal {
        class: classified.class,
        owner_name: lookups.owner_name(deal.owner_id.as_deref()),
        pipeline_name: lookups.pipeline_name(deal.pipeline_id.as_deref()),
        stage_name: lookups.stage_name(deal.pipeline_id.as_deref(), deal.stage_id.as_deref()),
        companies: companies.resolve_all(&deal.company_ids),
        deal,
    }
}

pub fn enrich_deals(
    deals: ClassifiedDeals,
    lookups: &Lookups,
    companies: &CompanyDirectory,
) -> EnrichedDeals {
    EnrichedDeals {
        new: deals
            .new
            .into_iter()
            .map(|d| enrich_deal(d, lookups, companies))
            .collect(),
        updated: deals
            .updated
            .into_iter()
            .map(|d| enrich_deal(d, lookups, companies))
            .collect(),
    }
}
