use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Formats in the shape the presentation layer expects: `2024-03-01T10:00:00.000Z`.
pub fn format_iso(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a source date, falling back to the current time when it can't be read.
pub fn to_iso_or_now(date_str: &str) -> String {
    format_iso(parse_source_date(date_str).unwrap_or_else(Utc::now))
}

/// Best-effort parse of dates as they show up in Graph API payloads, JSON feeds,
/// RSS and scraped `<time>`/`<abbr>` text.
pub fn parse_source_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim().trim_matches('"');
    if date_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    // Graph API: 2024-03-01T10:00:00+0000
    const WITH_OFFSET: &[&str] = &["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"];
    for fmt in WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(date_str, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    const NAIVE: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];
    for fmt in NAIVE {
        if let Ok(naive) = NaiveDateTime::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    const DATE_ONLY: &[&str] = &[
        "%Y-%m-%d",
        "%B %e, %Y",
        "%b %e, %Y",
        "%e %B %Y",
        "%e %b %Y",
        "%d.%m.%Y",
        "%m/%d/%Y",
    ];
    for fmt in DATE_ONLY {
        if let Ok(date) = NaiveDate::parse_from_str(date_str, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }

    None
}
