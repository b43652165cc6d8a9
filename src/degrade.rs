//! Degradation: decide what a run can still report from per-source outcomes.

use serde::Serialize;

use crate::acquire::AcquisitionResult;
use crate::enrich::{EnrichedDeals, EnrichedNote};
use crate::error::{FatalFailure, SourceFailure};

/// Whatever survived acquisition, plus one notice per failed source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub notes: Option<Vec<EnrichedNote>>,
    pub deals: Option<EnrichedDeals>,
    pub error_notices: Vec<String>,
}

impl ReportPayload {
    pub fn is_partial(&self) -> bool {
        !self.error_notices.is_empty()
    }

    /// True when no surviving source produced a single record.
    pub fn has_no_activity(&self) -> bool {
        let no_notes = self.notes.as_ref().map_or(true, |n| n.is_empty());
        let no_deals = self.deals.as_ref().map_or(true, |d| d.is_empty());
        no_notes && no_deals
    }

    pub fn note_count(&self) -> usize {
        self.notes.as_ref().map_or(0, |n| n.len())
    }

    pub fn deal_count(&self) -> usize {
        self.deals.as_ref().map_or(0, |d| d.len())
    }
}

fn notice(failure: &SourceFailure) -> String {
    failure.to_string()
}

/// Pure. Fails only when every source failed.
pub fn build_payload(result: AcquisitionResult) -> Result<ReportPayload, FatalFailure> {
    match (result.notes, result.deals) {
        (Err(notes), Err(deals)) => Err(FatalFailure {
            failures: vec![notes, deals],
        }),
        (notes, deals) => {
            let mut error_notices = Vec::new();
            if let Err(failure) = &notes {
                error_notices.push(notice(failure));
            }
            if let Err(failure) = &deals {
                error_notices.push(notice(failure));
            }
            Ok(ReportPayload {
                notes: notes.ok(),
                deals: deals.ok(),
                error_notices,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Source;
    use std::collections::BTreeSet;

    fn result(
        notes: Result<Vec<EnrichedNote>, SourceFailure>,
        deals: Result<EnrichedDeals, SourceFailure>,
    ) -> AcquisitionResult {
        AcquisitionResult {
            notes,
            deals,
            failed_companies: BTreeSet::new(),
        }
    }

    #[test]
    fn both_ok_has_no_notices() {
        let payload = build_payload(result(Ok(vec![]), Ok(EnrichedDeals::default()))).unwrap();
        assert!(payload.notes.is_some());
        assert!(payload.deals.is_some());
        assert!(!payload.is_partial());
        assert!(payload.has_no_activity());
    }

    #[test]
    fn one_failure_keeps_survivor_with_single_notice() {
        let failure = SourceFailure::new(Source::Notes, "HTTP 500");
        let payload = build_payload(result(Err(failure), Ok(EnrichedDeals::default()))).unwrap();
        assert!(payload.notes.is_none());
        assert!(payload.deals.is_some());
        assert_eq!(payload.error_notices, vec!["Failed to fetch notes: HTTP 500"]);
        assert!(payload.is_partial());
        assert_eq!(payload.note_count(), 0);
        assert_eq!(payload.deal_count(), 0);
    }

    #[test]
    fn deals_failure_names_deals() {
        let failure = SourceFailure::new(Source::Deals, "timed out after 120s");
        let payload = build_payload(result(Ok(vec![]), Err(failure))).unwrap();
        assert_eq!(payload.error_notices.len(), 1);
        assert!(payload.error_notices[0].contains("deals"));
        assert!(payload.error_notices[0].contains("timed out"));
    }

    #[test]
    fn both_failed_is_fatal() {
        let fatal = build_payload(result(
            Err(SourceFailure::new(Source::Notes, "a")),
            Err(SourceFailure::new(Source::Deals, "b")),
        ))
        .unwrap_err();
        assert_eq!(fatal.failures.len(), 2);
        assert_eq!(
            fatal.messages(),
            vec!["Failed to fetch notes: a", "Failed to fetch deals: b"]
        );
    }
}
