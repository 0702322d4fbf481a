//! Email `Date:` header parsing.
//!
//! The formats are tried in a fixed order and the first match wins. The
//! parsed offset is kept, so a message sent at 15:04 in `-0700` is filed
//! under 15:04, not under its UTC equivalent.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

/// One accepted date layout.
enum DateFormat {
    /// Layout ending in a numeric offset (`%z`).
    Offset(&'static str),
    /// Layout followed by a timezone name (`UTC`, `PST`, ...).
    Named(&'static str),
    /// RFC 3339 / ISO 8601.
    Rfc3339,
}

/// Accepted layouts, most common first. `%d` accepts one or two digits.
const FORMATS: &[DateFormat] = &[
    DateFormat::Offset("%a, %d %b %Y %H:%M:%S %z"),
    DateFormat::Offset("%d %b %Y %H:%M:%S %z"),
    DateFormat::Named("%a, %d %b %Y %H:%M:%S"),
    DateFormat::Named("%d %b %Y %H:%M:%S"),
    DateFormat::Rfc3339,
];

/// Parse an email date header.
///
/// A trailing parenthesized zone comment such as `(UTC)` is removed first.
/// Returns `None` if no known layout matches.
pub fn parse_email_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let cleaned = strip_zone_comment(date_str);
    if cleaned.is_empty() {
        return None;
    }

    // Try the header as-is, then without a (possibly wrong) day-of-week
    let no_dow = strip_day_of_week(cleaned);
    for candidate in [cleaned, no_dow] {
        for format in FORMATS {
            let parsed = match format {
                DateFormat::Offset(fmt) => DateTime::parse_from_str(candidate, fmt).ok(),
                DateFormat::Named(fmt) => parse_named_zone(candidate, fmt),
                DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(candidate).ok(),
            };
            if parsed.is_some() {
                return parsed;
            }
        }
    }
    None
}

/// Remove a trailing `(...)` comment and surrounding whitespace.
///
/// `"Mon, 2 Jan 2006 15:04:05 -0700 (UTC)"` → `"Mon, 2 Jan 2006 15:04:05 -0700"`
pub fn strip_zone_comment(s: &str) -> &str {
    let trimmed = s.trim();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind('(') {
            return trimmed[..open].trim_end();
        }
    }
    trimmed
}

/// Strip a leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> &str {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            if rest.starts_with(' ') {
                return rest.trim_start();
            }
        }
    }
    s
}

/// Parse `"<layout> <ZONE>"` where ZONE is an alphabetic timezone name.
///
/// Well-known abbreviations map to their offset; unknown names are taken as UTC.
fn parse_named_zone(s: &str, fmt: &str) -> Option<DateTime<FixedOffset>> {
    let (local, zone) = s.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(local.trim_end(), fmt).ok()?;
    let offset = FixedOffset::east_opt(named_zone_offset(zone) * 60)?;
    offset.from_local_datetime(&naive).single()
}

/// Offset in minutes east of UTC for well-known timezone abbreviations.
fn named_zone_offset(zone: &str) -> i32 {
    match zone.to_ascii_uppercase().as_str() {
        "EST" => -5 * 60,
        "EDT" => -4 * 60,
        "CST" => -6 * 60,
        "CDT" => -5 * 60,
        "MST" => -7 * 60,
        "MDT" => -6 * 60,
        "PST" => -8 * 60,
        "PDT" => -7 * 60,
        "CET" => 60,
        "CEST" => 2 * 60,
        "JST" => 9 * 60,
        _ => 0, // GMT, UTC, Z and anything unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(dt: DateTime<FixedOffset>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S %z").to_string()
    }

    #[test]
    fn test_parse_rfc2822_with_comment() {
        let dt = parse_email_date("Mon, 2 Jan 2006 15:04:05 -0700 (UTC)").unwrap();
        assert_eq!(fmt(dt), "2006-01-02 15:04:05 -0700");
    }

    #[test]
    fn test_parse_padded_day() {
        let dt = parse_email_date("Tue, 09 Jan 2024 08:00:00 +0100").unwrap();
        assert_eq!(fmt(dt), "2024-01-09 08:00:00 +0100");
    }

    #[test]
    fn test_parse_without_dow() {
        let dt = parse_email_date("2 Jan 2006 15:04:05 +0000").unwrap();
        assert_eq!(fmt(dt), "2006-01-02 15:04:05 +0000");
    }

    #[test]
    fn test_parse_wrong_dow() {
        // 2 Jan 2006 was a Monday
        let dt = parse_email_date("Fri, 2 Jan 2006 15:04:05 +0000").unwrap();
        assert_eq!(fmt(dt), "2006-01-02 15:04:05 +0000");
    }

    #[test]
    fn test_parse_named_tz() {
        let dt = parse_email_date("Mon, 2 Jan 2006 15:04:05 PST").unwrap();
        assert_eq!(fmt(dt), "2006-01-02 15:04:05 -0800");
        let dt = parse_email_date("Mon, 2 Jan 2006 15:04:05 GMT").unwrap();
        assert_eq!(fmt(dt), "2006-01-02 15:04:05 +0000");
    }

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_email_date("2024-03-15T10:30:00+02:00").unwrap();
        assert_eq!(fmt(dt), "2024-03-15 10:30:00 +0200");
    }

    #[test]
    fn test_unparseable() {
        assert!(parse_email_date("").is_none());
        assert!(parse_email_date("yesterday at noon").is_none());
        assert!(parse_email_date("(UTC)").is_none());
    }

    #[test]
    fn test_strip_zone_comment() {
        assert_eq!(
            strip_zone_comment("Mon, 2 Jan 2006 15:04:05 +0000 (GMT)  "),
            "Mon, 2 Jan 2006 15:04:05 +0000"
        );
        assert_eq!(strip_zone_comment("no comment"), "no comment");
    }
}
