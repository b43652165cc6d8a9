//! Reporting window resolution.
//!
//! The window always ends at the run instant. Its length depends on the
//! weekday in the configured local timezone: a Monday run looks back 72 hours
//! so Friday and the weekend are covered, every other day looks back 24 hours.
//! Both bounds are kept in UTC, which is how the CRM timestamps are compared.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::ReportError;

/// Hours covered by a regular run.
const DAILY_LOOKBACK_HOURS: i64 = 24;

/// Hours covered by a Monday run (Friday + weekend).
const MONDAY_LOOKBACK_HOURS: i64 = 72;

/// The half-open interval `[start, end)` a run reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_extended: bool,
}

impl ReportWindow {
    /// True when `ts` falls inside `[start, end)`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// Parse an IANA timezone identifier such as `America/Toronto`.
pub fn parse_timezone(name: &str) -> Result<Tz, ReportError> {
    name.parse::<Tz>()
        .map_err(|_| ReportError::ConfigurationError(format!("Invalid timezone: {}", name)))
}

/// Compute the look-back window for a run happening at `now`.
pub fn resolve_window(now: DateTime<Utc>, timezone: &str) -> Result<ReportWindow, ReportError> {
    let tz = parse_timezone(timezone)?;
    let local = now.with_timezone(&tz);

    let is_extended = local.weekday() == Weekday::Mon;
    let hours_back = if is_extended {
        MONDAY_LOOKBACK_HOURS
    } else {
        DAILY_LOOKBACK_HOURS
    };

    let end = now;
    let start = end - Duration::hours(hours_back);

    log::info!(
        "{} detected in {}: using {}-hour lookback ({} to {} UTC)",
        local.format("%A"),
        tz,
        hours_back,
        start.to_rfc3339(),
        end.to_rfc3339()
    );

    Ok(ReportWindow {
        start,
        end,
        is_extended,
    })
}

/// The local day whose activity the report describes.
///
/// A Monday report covers Friday; any other day covers yesterday.
pub fn report_date(now: DateTime<Utc>, timezone: &str) -> Result<DateTime<Tz>, ReportError> {
    let tz = parse_timezone(timezone)?;
    let local = now.with_timezone(&tz);
    let days_back = if local.weekday() == Weekday::Mon { 3 } else { 1 };
    Ok(local - Duration::days(days_back))
}

/// Report heading, e.g. `Friday, January 9, 2026 – CRM Executive Summary`.
pub fn report_title(now: DateTime<Utc>, timezone: &str) -> Result<String, ReportError> {
    let date = report_date(now, timezone)?;
    Ok(format!(
        "{} – CRM Executive Summary",
        date.format("%A, %B %-d, %Y")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TORONTO: &str = "America/Toronto";

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn tuesday_uses_24_hours() {
        // Tue 2026-01-13 07:00 EST
        let now = utc(2026, 1, 13, 12, 0);
        let window = resolve_window(now, TORONTO).unwrap();
        assert!(!window.is_extended);
        assert_eq!(window.end, now);
        assert_eq!(window.length(), Duration::hours(24));
        assert!(window.start < window.end);
    }

    #[test]
    fn monday_uses_72_hours() {
        // Mon 2026-01-12 07:00 EST
        let now = utc(2026, 1, 12, 12, 0);
        let window = resolve_window(now, TORONTO).unwrap();
        assert!(window.is_extended);
        assert_eq!(window.length(), Duration::hours(72));
        assert_eq!(window.start, utc(2026, 1, 9, 12, 0));
    }

    #[test]
    fn weekday_is_decided_in_local_time() {
        // 2026-01-13 03:00 UTC is still Monday 22:00 in Toronto
        let now = utc(2026, 1, 13, 3, 0);
        assert!(resolve_window(now, TORONTO).unwrap().is_extended);
        // ...but already Tuesday in UTC itself
        assert!(!resolve_window(now, "UTC").unwrap().is_extended);
    }

    #[test]
    fn spring_forward_boundaries() {
        // DST starts Sun 2026-03-08 02:00 local in Toronto.
        // Sat 2026-03-07 07:00 EST (UTC-5)
        let before = resolve_window(utc(2026, 3, 7, 12, 0), TORONTO).unwrap();
        assert!(!before.is_extended);
        assert_eq!(before.length(), Duration::hours(24));

        // Mon 2026-03-09 07:00 EDT (UTC-4): window reaches back across the transition
        let after = resolve_window(utc(2026, 3, 9, 11, 0), TORONTO).unwrap();
        assert!(after.is_extended);
        assert_eq!(after.length(), Duration::hours(72));
        assert_eq!(after.start, utc(2026, 3, 6, 11, 0));

        // Tue 2026-03-10 07:00 EDT
        let tuesday = resolve_window(utc(2026, 3, 10, 11, 0), TORONTO).unwrap();
        assert!(!tuesday.is_extended);
        assert_eq!(tuesday.length(), Duration::hours(24));
    }

    #[test]
    fn fall_back_boundaries() {
        // DST ends Sun 2026-11-01 02:00 local in Toronto.
        // Fri 2026-10-30 07:00 EDT (UTC-4)
        let before = resolve_window(utc(2026, 10, 30, 11, 0), TORONTO).unwrap();
        assert!(!before.is_extended);
        assert_eq!(before.length(), Duration::hours(24));

        // Mon 2026-11-02 07:00 EST (UTC-5)
        let after = resolve_window(utc(2026, 11, 2, 12, 0), TORONTO).unwrap();
        assert!(after.is_extended);
        assert_eq!(after.length(), Duration::hours(72));

        // Mon 2026-11-02 00:30 EST is 05:30 UTC; still Monday locally
        let midnight = resolve_window(utc(2026, 11, 2, 5, 30), TORONTO).unwrap();
        assert!(midnight.is_extended);

        // Sun 2026-11-01 23:30 EST is Mon 04:30 UTC; Sunday locally
        let sunday_night = resolve_window(utc(2026, 11, 2, 4, 30), TORONTO).unwrap();
        assert!(!sunday_night.is_extended);
    }

    #[test]
    fn window_is_half_open() {
        let window = resolve_window(utc(2026, 1, 13, 12, 0), TORONTO).unwrap();
        assert!(window.contains(window.start));
        assert!(!window.contains(window.end));
        assert!(window.contains(window.end - Duration::seconds(1)));
        assert!(!window.contains(window.start - Duration::seconds(1)));
    }

    #[test]
    fn unknown_timezone_is_configuration_error() {
        let err = resolve_window(utc(2026, 1, 13, 12, 0), "Mars/Olympus_Mons").unwrap_err();
        assert!(matches!(err, ReportError::ConfigurationError(_)));
    }

    #[test]
    fn resolve_is_deterministic() {
        let now = utc(2026, 6, 1, 11, 0);
        assert_eq!(
            resolve_window(now, TORONTO).unwrap(),
            resolve_window(now, TORONTO).unwrap()
        );
    }

    #[test]
    fn monday_title_reports_friday() {
        let title = report_title(utc(2026, 1, 12, 12, 0), TORONTO).unwrap();
        assert_eq!(title, "Friday, January 9, 2026 – CRM Executive Summary");
    }

    #[test]
    fn weekday_title_reports_yesterday() {
        let title = report_title(utc(2026, 1, 14, 12, 0), TORONTO).unwrap();
        assert_eq!(title, "Tuesday, January 13, 2026 – CRM Executive Summary");
    }
}
