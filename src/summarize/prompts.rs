//! Prompt construction and deterministic report text.
//!
//! Contexts are plain text blocks with markdown links back into Brevo, so the
//! summarizer can keep them verbatim. Timestamps are rendered in the report
//! timezone.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::crm::Company;
use crate::enrich::{EnrichedDeal, EnrichedDeals, EnrichedNote};

const BREVO_COMPANY_URL: &str = "https://app.brevo.com/companies/detail";
const BREVO_DEAL_URL: &str = "https://app.brevo.com/crm/deals/detail";
const NOT_AVAILABLE: &str = "N/A";

pub const PARTIAL_DATA_BANNER: &str = "⚠️ **Note:** Some data may be incomplete due to API errors.";

pub const SYSTEM_PROMPT: &str = r#"You are an executive assistant generating daily CRM summary reports for senior leadership.

Analyze the CRM activity provided and write a professional, concise executive summary.

FORMATTING REQUIREMENTS:
1. Use the provided report title exactly as given, as a level-one heading
2. Group all activity by owner (## for each owner name)
3. Within each owner, group items by theme under ### headings
4. Use action-oriented bullet points, no narrative prose
5. Keep every markdown hyperlink for companies and deals exactly as provided
6. Include the relevant attributes: distributor, business division, industry, pipeline, stage, amount, opportunity type
7. Use **bold** for key metrics and outcomes
8. Close with a short list of notable patterns or insights

FOR NOTES: summarize the specific content of each note, including decisions, action items and next steps. Never write generic summaries.
FOR DEALS: always show owner, deal name with link, stage, amount, distributor and opportunity type.

Do not include pleasantries, conversational language or redundant information."#;

/// `$1,234.56` style, with a leading minus for negatives.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

pub fn company_link(company: &Company) -> String {
    format!("[{}]({}/{})", company.name, BREVO_COMPANY_URL, company.id)
}

pub fn deal_link(deal_id: &str, deal_name: &str) -> String {
    let name = if deal_name.trim().is_empty() {
        "Untitled Deal"
    } else {
        deal_name
    };
    format!("[{}]({}/{})", name, BREVO_DEAL_URL, deal_id)
}

fn local_time(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string()
}

fn local_time_opt(ts: Option<DateTime<Utc>>, tz: Tz) -> String {
    ts.map(|t| local_time(t, tz))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(NOT_AVAILABLE)
}

fn company_block(companies: &[Company]) -> String {
    if companies.is_empty() {
        return "    - No associated companies".to_string();
    }
    companies
        .iter()
        .map(|c| {
            format!(
                "    - Company: {}\n      Distributor: {}\n      Business Division: {}\n      Industry: {}",
                company_link(c),
                or_na(c.distributor.as_deref()),
                or_na(c.business_division.as_deref()),
                or_na(c.industry.as_deref()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn notes_context(notes: &[EnrichedNote], tz: Tz) -> String {
    if notes.is_empty() {
        return "No notes recorded during this period.".to_string();
    }
    notes
        .iter()
        .enumerate()
        .map(|(i, n)| {
            format!(
                "Note #{}:\n  Author: {}\n  Created: {}\n  Content: {}\n  Associated Companies:\n{}\n",
                i + 1,
                n.author_name,
                local_time(n.note.created_at, tz),
                n.note.text.trim(),
                company_block(&n.companies),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn deal_entry(label: &str, index: usize, d: &EnrichedDeal, tz: Tz) -> String {
    let mut entry = format!(
        "{} #{}:\n  Deal Name: {}\n  Owner: {}\n  Pipeline: {}\n  Stage: {}\n  Amount: {}\n",
        label,
        index,
        deal_link(&d.deal.id, &d.deal.name),
        d.owner_name,
        d.pipeline_name,
        d.stage_name,
        format_currency(d.deal.amount),
    );
    if d.deal.yearly_spend_amount > 0.0 {
        entry.push_str(&format!(
            "  Yearly Spend: {}\n",
            format_currency(d.deal.yearly_spend_amount)
        ));
    }
    entry.push_str(&format!(
        "  Distributor: {}\n  Opportunity Type: {}\n  Created: {}\n",
        or_na(d.deal.distributor.as_deref()),
        or_na(d.deal.opportunity_type.as_deref()),
        local_time_opt(d.deal.created_at, tz),
    ));
    if d.deal.stage_updated_at.is_some() {
        entry.push_str(&format!(
            "  Stage Updated: {}\n",
            local_time_opt(d.deal.stage_updated_at, tz)
        ));
    }
    if !d.companies.is_empty() {
        entry.push_str("  Associated Companies:\n");
        entry.push_str(&company_block(&d.companies));
        entry.push('\n');
    }
    entry
}

pub fn deals_context(deals: &EnrichedDeals, tz: Tz) -> String {
    if deals.is_empty() {
        return "No deals created or updated during this period.".to_string();
    }
    let mut parts = Vec::new();
    if !deals.new.is_empty() {
        parts.push("=== NEW DEALS CREATED ===\n".to_string());
        for (i, d) in deals.new.iter().enumerate() {
            parts.push(deal_entry("New Deal", i + 1, d, tz));
        }
    }
    if !deals.updated.is_empty() {
        parts.push("=== DEALS UPDATED (Stage Changes) ===\n".to_string());
        for (i, d) in deals.updated.iter().enumerate() {
            parts.push(deal_entry("Updated Deal", i + 1, d, tz));
        }
    }
    parts.join("\n")
}

pub fn notes_prompt(title: &str, notes: &[EnrichedNote], tz: Tz) -> String {
    format!(
        "Generate part 1 of 2 of the executive CRM summary, covering company notes only.\n\n\
         REPORT TITLE: {} (Part 1 of 2: Notes)\n\n\
         CRM NOTES:\n{}\n\n\
         Generate the report following all formatting requirements.",
        title,
        notes_context(notes, tz)
    )
}

pub fn deals_prompt(title: &str, deals: &EnrichedDeals, tz: Tz) -> String {
    format!(
        "Generate part 2 of 2 of the executive CRM summary, covering deals only.\n\n\
         REPORT TITLE: {} (Part 2 of 2: Deals)\n\n\
         DEALS:\n{}\n\n\
         Generate the report following all formatting requirements.",
        title,
        deals_context(deals, tz)
    )
}

/// Banner prepended to each part of a partial report.
pub fn partial_banner(notices: &[String]) -> String {
    let mut banner = format!("{}\n", PARTIAL_DATA_BANNER);
    for notice in notices {
        banner.push_str(&format!("- {}\n", notice));
    }
    banner.push('\n');
    banner
}

pub fn empty_report(title: &str, notices: &[String]) -> String {
    let mut report = format!(
        "# {}\n\n## No CRM Activity\n\nNo notes or deals were created or updated during this reporting period.\n",
        title
    );
    if !notices.is_empty() {
        report.push('\n');
        report.push_str(&partial_banner(notices));
    }
    report
}

pub fn error_summary(title: &str, errors: &[String]) -> String {
    let list = errors
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# {}\n\n## ⚠️ Partial Report - Errors Encountered\n\n\
         The following errors occurred while generating this report:\n\n{}\n\n\
         Please contact the system administrator to investigate these issues.\n\n\
         **Note:** This is a partial report and may not contain all CRM activity data.\n",
        title, list
    )
}

/// Stand-in for one part when the summarizer call failed.
pub fn summarizer_failure(title: &str, part: &str, cause: &str) -> String {
    error_summary(
        title,
        &[format!("Failed to generate {} summary: {}", part, cause)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DealClass, QualifiedNote};
    use crate::crm::RawDeal;
    use chrono::TimeZone;

    fn tz() -> Tz {
        "America/Toronto".parse().unwrap()
    }

    fn company() -> Company {
        Company {
            id: "c1".to_string(),
            name: "Northwind".to_string(),
            distributor: Some("Direct".to_string()),
            business_division: None,
            industry: Some("Health".to_string()),
        }
    }

    fn note() -> EnrichedNote {
        EnrichedNote {
            note: QualifiedNote {
                id: "n1".to_string(),
                text: "Agreed on pilot scope\n".to_string(),
                author_id: Some("u1".to_string()),
                created_at: Utc.with_ymd_and_hms(2026, 1, 13, 15, 0, 0).unwrap(),
                company_ids: vec!["c1".to_string()],
            },
            author_name: "Dana Reyes".to_string(),
            companies: vec![company()],
        }
    }

    fn enriched_deal(class: DealClass) -> EnrichedDeal {
        EnrichedDeal {
            class,
            deal: RawDeal {
                id: "d9".to_string(),
                name: "Expansion".to_string(),
                owner_id: Some("u1".to_string()),
                stage_id: Some("s1".to_string()),
                pipeline_id: Some("p1".to_string()),
                amount: 1234.5,
                yearly_spend_amount: 0.0,
                opportunity_type: Some("Upsell".to_string()),
                distributor: None,
                created_at: Some(Utc.with_ymd_and_hms(2026, 1, 13, 15, 0, 0).unwrap()),
                stage_updated_at: None,
                modified_at: None,
                company_ids: vec![],
            },
            owner_name: "Dana Reyes".to_string(),
            pipeline_name: "Sales".to_string(),
            stage_name: "Proposal".to_string(),
            companies: vec![],
        }
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(1234.56), "$1,234.56");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_currency(-42.5), "-$42.50");
    }

    #[test]
    fn links_point_into_brevo() {
        assert_eq!(
            company_link(&company()),
            "[Northwind](https://app.brevo.com/companies/detail/c1)"
        );
        assert_eq!(
            deal_link("d9", ""),
            "[Untitled Deal](https://app.brevo.com/crm/deals/detail/d9)"
        );
    }

    #[test]
    fn notes_context_renders_local_time_and_attributes() {
        let ctx = notes_context(&[note()], tz());
        assert!(ctx.contains("Author: Dana Reyes"));
        assert!(ctx.contains("Created: 2026-01-13 10:00 EST"));
        assert!(ctx.contains("Content: Agreed on pilot scope"));
        assert!(ctx.contains("Distributor: Direct"));
        assert!(ctx.contains("Business Division: N/A"));
    }

    #[test]
    fn deals_context_has_sections() {
        let deals = EnrichedDeals {
            new: vec![enriched_deal(DealClass::New)],
            updated: vec![enriched_deal(DealClass::Updated)],
        };
        let ctx = deals_context(&deals, tz());
        assert!(ctx.contains("=== NEW DEALS CREATED ==="));
        assert!(ctx.contains("=== DEALS UPDATED (Stage Changes) ==="));
        assert!(ctx.contains("Amount: $1,234.50"));
        assert!(ctx.contains("Opportunity Type: Upsell"));
        assert!(ctx.contains("https://app.brevo.com/crm/deals/detail/d9"));
    }

    #[test]
    fn empty_contexts() {
        assert_eq!(
            notes_context(&[], tz()),
            "No notes recorded during this period."
        );
        assert_eq!(
            deals_context(&EnrichedDeals::default(), tz()),
            "No deals created or updated during this period."
        );
    }

    #[test]
    fn fallback_reports_carry_title_and_errors() {
        let empty = empty_report("Monday, January 12, 2026 – CRM Executive Summary", &[]);
        assert!(empty.starts_with("# Monday, January 12, 2026"));
        assert!(empty.contains("## No CRM Activity"));
        assert!(!empty.contains(PARTIAL_DATA_BANNER));

        let partial = empty_report("T", &["Failed to fetch notes: boom".to_string()]);
        assert!(partial.contains(PARTIAL_DATA_BANNER));
        assert!(partial.contains("- Failed to fetch notes: boom"));

        let failed = summarizer_failure("T", "deals", "HTTP 500");
        assert!(failed.contains("- Failed to generate deals summary: HTTP 500"));
    }
}
