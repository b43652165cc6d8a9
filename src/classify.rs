//! Record classification: which notes qualify for the report, and whether a
//! deal is new or updated relative to the reporting window.
//!
//! Notes that fail qualification are expected volume reduction, not errors, so
//! they are dropped with a debug line only.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::crm::{RawDeal, RawNote};
use crate::window::ReportWindow;

/// A company-level, human-written note.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedNote {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub company_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DealClass {
    New,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedDeal {
    pub class: DealClass,
    pub deal: RawDeal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedDeals {
    pub new: Vec<ClassifiedDeal>,
    pub updated: Vec<ClassifiedDeal>,
}

impl ClassifiedDeals {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new.len() + self.updated.len()
    }
}

/// True when `text` ends with the automation marker, ignoring trailing whitespace.
pub fn is_automated(text: &str, marker: &str) -> bool {
    let marker = marker.trim_end();
    !marker.is_empty() && text.trim_end().ends_with(marker)
}

/// Note qualification: linked to a company and nothing else, and not written
/// by the CRM's automation.
pub fn qualifies(note: &RawNote, marker: &str) -> bool {
    !note.company_ids.is_empty()
        && note.contact_ids.is_empty()
        && note.deal_ids.is_empty()
        && !is_automated(&note.text, marker)
}

pub fn classify_notes(raw: Vec<RawNote>, marker: &str) -> Vec<QualifiedNote> {
    let total = raw.len();
    let mut seen = HashSet::new();
    let mut qualified = Vec::new();

    for note in raw {
        if !qualifies(&note, marker) {
            log::debug!("Filtering out note {} (not company-level or automated)", note.id);
            continue;
        }
        if !seen.insert(note.id.clone()) {
            log::warn!("Duplicate note {} in CRM response, keeping first", note.id);
            continue;
        }
        qualified.push(QualifiedNote {
            id: note.id,
            text: note.text,
            author_id: note.author_id,
            created_at: note.created_at,
            company_ids: note.company_ids,
        });
    }

    log::info!(
        "Filtered {} notes down to {} company-level, non-automated notes",
        total,
        qualified.len()
    );
    qualified
}

fn is_new(deal: &RawDeal, window: &ReportWindow) -> bool {
    deal.created_at.is_some_and(|ts| window.contains(ts))
}

fn is_updated(deal: &RawDeal, window: &ReportWindow) -> bool {
    match (deal.stage_updated_at, deal.created_at) {
        (Some(staged), Some(created)) => window.contains(staged) && created < window.start,
        _ => false,
    }
}

/// Classify one deal, or `None` when it falls outside both predicates.
pub fn classify_deal(deal: &RawDeal, window: &ReportWindow) -> Option<DealClass> {
    let new = is_new(deal, window);
    let updated = is_updated(deal, window);

    // The predicates are disjoint on created_at; both holding means bad data.
    if new && updated {
        log::warn!(
            "Data-quality warning: deal {} matches both NEW and UPDATED, keeping NEW",
            deal.id
        );
    }

    if new {
        Some(DealClass::New)
    } else if updated {
        Some(DealClass::Updated)
    } else {
        None
    }
}

pub fn classify_deals(raw: Vec<RawDeal>, window: &ReportWindow) -> ClassifiedDeals {
    let total = raw.len();
    let mut seen = HashSet::new();
    let mut result = ClassifiedDeals::default();

    for deal in raw {
        if deal.created_at.is_none() {
            log::warn!("Deal {} missing created_at, skipping", deal.id);
            continue;
        }
        if !seen.insert(deal.id.clone()) {
            log::warn!("Duplicate deal {} in CRM response, keeping first", deal.id);
            continue;
        }
        match classify_deal(&deal, window) {
            Some(DealClass::New) => {
                log::debug!("Deal {} classified as NEW", deal.name);
                result.new.push(ClassifiedDeal {
                    class: DealClass::New,
                    deal,
                });
            }
            Some(DealClass::Updated) => {
                log::debug!("Deal {} classified as UPDATED", deal.name);
                result.updated.push(ClassifiedDeal {
                    class: DealClass::Updated,
                    deal,
                });
            }
            None => {}
        }
    }

    log::info!(
        "Differentiated {} deals into {} new, {} updated",
        total,
        result.new.len(),
        result.updated.len()
    );
    result
}
