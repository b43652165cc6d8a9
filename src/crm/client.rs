//! REST client for the Brevo CRM API.
//!
//! Uses reqwest with `api-key` header auth. Notes and deals are paged with
//! `offset`/`limit` in descending order; the API has returned both bare arrays
//! and `{ "items": [...] }` envelopes, so both are accepted.

use async_trait::async_trait;
use serde_json::Value;

use chrono::{DateTime, Utc};

use super::{parse_timestamp, Company, CrmConfig, CrmError, CrmSource, RawDeal, RawNote};
use crate::enrich::UNKNOWN_COMPANY;
use crate::http::{build_client, send_with_retry, RetryPolicy};
use crate::window::ReportWindow;

pub struct BrevoClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    page_size: u32,
    max_records: u32,
    retry: RetryPolicy,
}

impl BrevoClient {
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CrmError::NoApiKey)?;

        Ok(Self {
            client: build_client(config.request_timeout_secs)?,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
            max_records: config.max_records,
            retry: config.retry.clone(),
        })
    }

    /// `label` names the call in retry log lines.
    async fn get_json(
        &self,
        label: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, CrmError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);

        let request = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("api-key", &self.api_key)
            .query(query);

        let resp = send_with_retry(request, &self.retry, label).await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(CrmError::Api { status, message });
        }

        Ok(resp.json().await?)
    }

    fn page_query(&self, offset: u32) -> Vec<(&'static str, String)> {
        vec![
            ("offset", offset.to_string()),
            ("limit", self.page_size.to_string()),
            ("sort", "desc".to_string()),
        ]
    }
}

#[async_trait]
impl CrmSource for BrevoClient {
    async fn fetch_notes(&self, window: &ReportWindow) -> Result<Vec<RawNote>, CrmError> {
        log::info!(
            "Fetching notes from {} to {}",
            window.start.to_rfc3339(),
            window.end.to_rfc3339()
        );

        let mut notes = Vec::new();
        let mut offset = 0;

        loop {
            let body = self
                .get_json(
                    &format!("brevo notes offset={}", offset),
                    "/v3/crm/notes",
                    &self.page_query(offset),
                )
                .await?;
            let page = extract_items(body, "notes")?;
            let (kept, reached_older) = notes_in_window(&page, window);
            notes.extend(kept);

            match next_page(offset, page.len(), reached_older, self.page_size, self.max_records) {
                PageStep::Next(next) => offset = next,
                PageStep::ReachedOlder => {
                    log::info!("Reached notes outside time range, stopping pagination");
                    break;
                }
                PageStep::Capped => {
                    log::warn!("Reached pagination safety limit ({} notes)", self.max_records);
                    break;
                }
                PageStep::Exhausted => break,
            }
        }

        log::info!("Retrieved {} notes within time range", notes.len());
        Ok(notes)
    }

    async fn fetch_deals(&self, window: &ReportWindow) -> Result<Vec<RawDeal>, CrmError> {
        log::info!(
            "Fetching deals from {} to {}",
            window.start.to_rfc3339(),
            window.end.to_rfc3339()
        );

        let mut deals = Vec::new();
        let mut offset = 0;

        loop {
            let body = self
                .get_json(
                    &format!("brevo deals offset={}", offset),
                    "/v3/crm/deals",
                    &self.page_query(offset),
                )
                .await?;
            let page = extract_items(body, "deals")?;
            deals.extend(deals_in_window(&page, window));

            // Sorted by creation, so an old deal can still have been updated.
            match next_page(offset, page.len(), false, self.page_size, self.max_records) {
                PageStep::Next(next) => offset = next,
                PageStep::Capped => {
                    log::warn!("Reached pagination safety limit ({} deals)", self.max_records);
                    break;
                }
                PageStep::ReachedOlder | PageStep::Exhausted => break,
            }
        }

        log::info!("Retrieved {} deals touched within time range", deals.len());
        Ok(deals)
    }

    async fn fetch_company(&self, company_id: &str) -> Result<Option<Company>, CrmError> {
        log::debug!("Fetching company {}", company_id);
        match self
            .get_json(
                &format!("brevo company {}", company_id),
                &format!("/v3/companies/{}", company_id),
                &[],
            )
            .await
        {
            Ok(body) => Ok(Some(parse_company(&body, company_id))),
            Err(CrmError::Api { status: 404, .. }) => {
                log::warn!("Company {} not found", company_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStep {
    Next(u32),
    /// The page was empty.
    Exhausted,
    /// A record older than the window was seen on a newest-first listing.
    ReachedOlder,
    /// The next offset would pass `max_records`.
    Capped,
}

fn next_page(
    offset: u32,
    page_len: usize,
    reached_older: bool,
    page_size: u32,
    max_records: u32,
) -> PageStep {
    if page_len == 0 {
        return PageStep::Exhausted;
    }
    if reached_older {
        return PageStep::ReachedOlder;
    }
    let next = offset.saturating_add(page_size);
    if next > max_records {
        PageStep::Capped
    } else {
        PageStep::Next(next)
    }
}

/// Notes of one newest-first page that fall in the window. The flag is set at
/// the first note older than the window start; the rest of the page is skipped.
fn notes_in_window(page: &[Value], window: &ReportWindow) -> (Vec<RawNote>, bool) {
    let mut notes = Vec::new();
    for item in page {
        let note = match parse_note(item) {
            Ok(n) => n,
            Err(e) => {
                log::warn!("Skipping malformed note: {}", e);
                continue;
            }
        };
        if window.contains(note.created_at) {
            notes.push(note);
        } else if note.created_at < window.start {
            return (notes, true);
        }
    }
    (notes, false)
}

fn deals_in_window(page: &[Value], window: &ReportWindow) -> Vec<RawDeal> {
    page.iter()
        .filter_map(|item| match parse_deal(item) {
            Ok(deal) => touched_in_window(&deal, window).then_some(deal),
            Err(e) => {
                log::warn!("Skipping malformed deal: {}", e);
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Unwrap a page: a bare array, or an object holding `items` or `key`.
fn extract_items(body: Value, key: &str) -> Result<Vec<Value>, CrmError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            let items = map.remove("items").or_else(|| map.remove(key));
            match items {
                Some(Value::Array(items)) => Ok(items),
                Some(other) => Err(CrmError::UnexpectedResponse(format!(
                    "'{}' is not an array: {}",
                    key, other
                ))),
                None => Ok(Vec::new()),
            }
        }
        other => Err(CrmError::UnexpectedResponse(other.to_string())),
    }
}

/// Ids come back as strings or numbers depending on the object type.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("id").and_then(id_string),
        _ => None,
    }
}

fn id_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(id_string).collect())
        .unwrap_or_default()
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_field(value: &Value, key: &str) -> f64 {
    match value.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_note(item: &Value) -> Result<RawNote, CrmError> {
    let id = item
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| CrmError::UnexpectedResponse(format!("note without id: {}", item)))?;
    let created_raw = str_field(item, "createdAt")
        .ok_or_else(|| CrmError::UnexpectedResponse(format!("note {} without createdAt", id)))?;

    Ok(RawNote {
        text: str_field(item, "text").unwrap_or_default(),
        author_id: item
            .get("authorId")
            .or_else(|| item.get("author"))
            .and_then(id_string),
        created_at: parse_timestamp(&created_raw)?,
        company_ids: id_list(item.get("companyIds")),
        contact_ids: id_list(item.get("contactIds")),
        deal_ids: id_list(item.get("dealIds")),
        id,
    })
}

/// Only `created_at` decides whether a deal is usable; a bad secondary
/// timestamp is dropped with a warning.
fn optional_timestamp(deal_id: &str, field: &str, raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match parse_timestamp(&raw) {
        Ok(ts) => Some(ts),
        Err(e) => {
            log::warn!("Deal {}: ignoring unparseable {}: {}", deal_id, field, e);
            None
        }
    }
}

fn parse_deal(item: &Value) -> Result<RawDeal, CrmError> {
    let id = item
        .get("id")
        .and_then(id_string)
        .ok_or_else(|| CrmError::UnexpectedResponse(format!("deal without id: {}", item)))?;

    // Attributes are nested under "attributes" in v3 and flat in older payloads.
    let attrs = item.get("attributes").unwrap_or(item);

    let created_at = str_field(attrs, "created_at")
        .or_else(|| str_field(attrs, "createdAt"))
        .or_else(|| str_field(item, "createdAt"))
        .map(|raw| parse_timestamp(&raw))
        .transpose()?;
    let modified_at = optional_timestamp(
        &id,
        "last_updated_date",
        str_field(attrs, "last_updated_date")
            .or_else(|| str_field(attrs, "modified_at"))
            .or_else(|| str_field(attrs, "modifiedAt")),
    );
    let stage_updated_at =
        optional_timestamp(&id, "stage_updated_at", str_field(attrs, "stage_updated_at"));

    Ok(RawDeal {
        name: str_field(attrs, "deal_name").unwrap_or_else(|| "Untitled Deal".to_string()),
        owner_id: attrs.get("deal_owner").and_then(id_string),
        stage_id: str_field(attrs, "deal_stage"),
        pipeline_id: str_field(attrs, "pipeline"),
        amount: number_field(attrs, "amount"),
        yearly_spend_amount: number_field(attrs, "yearly_spend_amount"),
        opportunity_type: str_field(attrs, "deal_type"),
        distributor: str_field(attrs, "distributor"),
        created_at,
        stage_updated_at,
        modified_at,
        company_ids: id_list(item.get("linkedCompaniesIds")),
        id,
    })
}

fn parse_company(body: &Value, requested_id: &str) -> Company {
    let attrs = body.get("attributes").unwrap_or(body);
    Company {
        id: body
            .get("id")
            .and_then(id_string)
            .unwrap_or_else(|| requested_id.to_string()),
        name: str_field(attrs, "name").unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
        distributor: str_field(attrs, "distributor"),
        business_division: str_field(attrs, "business_division_2"),
        industry: str_field(attrs, "industry"),
    }
}

/// Prefilter: keep deals created, modified or stage-updated inside the window.
///
/// The split into new/updated happens later in `classify`.
fn touched_in_window(deal: &RawDeal, window: &ReportWindow) -> bool {
    [deal.created_at, deal.modified_at, deal.stage_updated_at]
        .into_iter()
        .flatten()
        .any(|ts| window.contains(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn window() -> ReportWindow {
        ReportWindow {
            start: Utc.with_ymd_and_hms(2026, 1, 12, 12, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 1, 13, 12, 0, 0).unwrap(),
            is_extended: false,
        }
    }

    #[test]
    fn extract_items_accepts_all_envelopes() {
        assert_eq!(extract_items(json!([{"id": 1}]), "notes").unwrap().len(), 1);
        assert_eq!(
            extract_items(json!({"items": [{"id": 1}, {"id": 2}]}), "notes")
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            extract_items(json!({"deals": [{"id": 1}]}), "deals")
                .unwrap()
                .len(),
            1
        );
        assert!(extract_items(json!({"count": 0}), "notes").unwrap().is_empty());
        assert!(extract_items(json!("nope"), "notes").is_err());
    }

    #[test]
    fn parse_note_reads_links_and_author_object() {
        let note = parse_note(&json!({
            "id": "n1",
            "text": "Met with purchasing",
            "authorId": {"id": "u1", "email": "rep@example.com"},
            "companyIds": ["c1"],
            "contactIds": [],
            "dealIds": [],
            "createdAt": "2026-01-13T10:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(note.id, "n1");
        assert_eq!(note.author_id.as_deref(), Some("u1"));
        assert_eq!(note.company_ids, vec!["c1".to_string()]);
        assert!(note.contact_ids.is_empty());
        assert_eq!(
            note.created_at,
            Utc.with_ymd_and_hms(2026, 1, 13, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_note_without_created_at_fails() {
        assert!(parse_note(&json!({"id": "n1", "text": "x"})).is_err());
    }

    #[test]
    fn parse_deal_nested_attributes() {
        let deal = parse_deal(&json!({
            "id": "d1",
            "attributes": {
                "deal_name": "Widget rollout",
                "deal_owner": "u1",
                "deal_stage": "s1",
                "pipeline": "p1",
                "amount": 12500.5,
                "deal_type": "New Business",
                "distributor": "Acme Dist",
                "created_at": "2026-01-13T09:00:00Z",
                "stage_updated_at": "2026-01-13T10:00:00Z",
                "last_updated_date": "2026-01-13T11:00:00Z"
            },
            "linkedCompaniesIds": ["c9"]
        }))
        .unwrap();

        assert_eq!(deal.name, "Widget rollout");
        assert_eq!(deal.owner_id.as_deref(), Some("u1"));
        assert_eq!(deal.pipeline_id.as_deref(), Some("p1"));
        assert_eq!(deal.amount, 12500.5);
        assert_eq!(deal.opportunity_type.as_deref(), Some("New Business"));
        assert_eq!(deal.company_ids, vec!["c9".to_string()]);
        assert!(deal.modified_at.is_some());
    }

    #[test]
    fn parse_deal_flat_with_defaults() {
        let deal = parse_deal(&json!({
            "id": "d2",
            "createdAt": "2026-01-01T00:00:00Z",
            "amount": "300"
        }))
        .unwrap();
        assert_eq!(deal.name, "Untitled Deal");
        assert_eq!(deal.amount, 300.0);
        assert!(deal.stage_updated_at.is_none());
        assert!(deal.created_at.is_some());
    }

    #[test]
    fn prefilter_keeps_any_touch_in_window() {
        let base = parse_deal(&json!({
            "id": "d3",
            "attributes": {"created_at": "2025-12-01T00:00:00Z"}
        }))
        .unwrap();
        assert!(!touched_in_window(&base, &window()));

        let mut modified = base.clone();
        modified.modified_at = Some(Utc.with_ymd_and_hms(2026, 1, 13, 0, 0, 0).unwrap());
        assert!(touched_in_window(&modified, &window()));

        let mut staged = base;
        staged.stage_updated_at = Some(window().start);
        assert!(touched_in_window(&staged, &window()));
    }

    #[test]
    fn parse_company_maps_attributes() {
        let company = parse_company(
            &json!({
                "id": "c1",
                "attributes": {
                    "name": "Northwind",
                    "distributor": "Direct",
                    "business_division_2": "Healthcare",
                    "industry": "Hospitals"
                }
            }),
            "c1",
        );
        assert_eq!(company.name, "Northwind");
        assert_eq!(company.business_division.as_deref(), Some("Healthcare"));
    }

    #[test]
    fn new_requires_api_key() {
        let config = CrmConfig::default();
        assert!(matches!(BrevoClient::new(&config), Err(CrmError::NoApiKey)));
    }

    #[test]
    fn bad_secondary_timestamp_keeps_deal() {
        let deal = parse_deal(&json!({
            "id": "d1",
            "attributes": {
                "created_at": "2026-01-13T09:00:00Z",
                "last_updated_date": "not-a-date",
                "stage_updated_at": "yesterday"
            }
        }))
        .unwrap();
        assert_eq!(
            deal.created_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 13, 9, 0, 0).unwrap())
        );
        assert!(deal.modified_at.is_none());
        assert!(deal.stage_updated_at.is_none());

        let page = [json!({
            "id": "d1",
            "attributes": {"created_at": "2026-01-13T09:00:00Z", "last_updated_date": "not-a-date"}
        })];
        assert_eq!(deals_in_window(&page, &window()).len(), 1);
    }

    #[test]
    fn bad_created_at_rejects_deal() {
        assert!(parse_deal(&json!({
            "id": "d1",
            "attributes": {"created_at": "not-a-date"}
        }))
        .is_err());
    }

    fn raw_note(id: &str, created_at: &str) -> Value {
        json!({"id": id, "text": "x", "companyIds": ["c1"], "createdAt": created_at})
    }

    #[test]
    fn notes_page_stops_at_first_older_note() {
        let page = vec![
            raw_note("future", "2026-01-13T12:00:00Z"),
            raw_note("n1", "2026-01-13T11:00:00Z"),
            json!({"id": "broken"}),
            raw_note("n2", "2026-01-12T12:00:00Z"),
            raw_note("old", "2026-01-12T11:59:59Z"),
            raw_note("after-old", "2026-01-13T10:00:00Z"),
        ];
        let (notes, reached_older) = notes_in_window(&page, &window());
        let ids: Vec<_> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
        assert!(reached_older);
    }

    #[test]
    fn notes_page_inside_window_keeps_paging() {
        let page = vec![raw_note("n1", "2026-01-13T11:00:00Z")];
        let (notes, reached_older) = notes_in_window(&page, &window());
        assert_eq!(notes.len(), 1);
        assert!(!reached_older);
        assert_eq!(next_page(0, page.len(), reached_older, 50, 1000), PageStep::Next(50));
    }

    #[test]
    fn paging_stops_on_empty_page_older_record_or_cap() {
        assert_eq!(next_page(100, 0, false, 50, 1000), PageStep::Exhausted);
        assert_eq!(next_page(100, 0, true, 50, 1000), PageStep::Exhausted);
        assert_eq!(next_page(100, 50, true, 50, 1000), PageStep::ReachedOlder);
        assert_eq!(next_page(950, 50, false, 50, 1000), PageStep::Next(1000));
        assert_eq!(next_page(1000, 50, false, 50, 1000), PageStep::Capped);
    }

    #[test]
    fn retry_section_reaches_client() {
        let config: CrmConfig = serde_json::from_str(
            r#"{ "apiKey": "xkeysib", "retry": { "maxAttempts": 6 } }"#,
        )
        .unwrap();
        let client = BrevoClient::new(&config).unwrap();
        assert_eq!(client.retry.max_attempts, 6);
        assert_eq!(client.retry.initial_backoff_ms, 250);
    }
}
