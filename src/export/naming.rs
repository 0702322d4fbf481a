//! Output naming: the `{date}_{subject}` prefix shared by a message's folder and files.

use chrono::{DateTime, FixedOffset, Local};
use tracing::warn;

use crate::parser::date::parse_email_date;

/// Timestamp layout of the prefix.
pub const DATE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Length of a formatted [`DATE_FORMAT`] timestamp.
const DATE_LEN: usize = 19;

/// Subject placeholder when nothing survives sanitization.
pub const NO_SUBJECT: &str = "no-subject";

/// Default upper bound for the whole prefix, in bytes.
pub const DEFAULT_PREFIX_BUDGET: usize = 200;

/// Planned name of one message's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedName {
    /// `{date}_{subject}`: the folder name and the stem of every file in it.
    pub prefix: String,
    /// Resolved message date, in the offset of the `Date:` header.
    pub date: DateTime<FixedOffset>,
    /// Set when the header did not parse and the current time was used.
    pub date_fallback: bool,
}

/// Plan the output name for a message.
///
/// Deterministic for a given date header and subject, except that an
/// unparseable date resolves to the current time. The prefix never exceeds
/// `budget` bytes.
pub fn plan(date_header: &str, subject: &str, budget: usize) -> PlannedName {
    let (date, date_fallback) = match parse_email_date(date_header) {
        Some(date) => (date, false),
        None => {
            warn!(date = %date_header, "Unable to parse date, using current time");
            (Local::now().fixed_offset(), true)
        }
    };

    let stamp = date.format(DATE_FORMAT).to_string();
    let subject_budget = budget.saturating_sub(DATE_LEN + 1).max(1);
    let subject = truncate_bytes(&sanitize_subject(subject), subject_budget).to_string();

    PlannedName {
        prefix: format!("{stamp}_{subject}"),
        date,
        date_fallback,
    }
}

/// Sanitize a subject line, substituting [`NO_SUBJECT`] when nothing is left.
pub fn sanitize_subject(subject: &str) -> String {
    let cleaned = sanitize_component(subject);
    if cleaned.is_empty() {
        NO_SUBJECT.to_string()
    } else {
        cleaned
    }
}

/// Reduce free text to a safe file-name component.
///
/// Keeps letters, digits, `_`, `-` and `.`; drops everything else except
/// whitespace, whose runs become a single `-`. Repeated hyphens collapse and
/// leading or trailing hyphens are trimmed. May return an empty string.
pub fn sanitize_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_hyphen = false;

    for c in s.chars() {
        let next = if c.is_whitespace() || c == '-' {
            '-'
        } else if c.is_alphanumeric() || c == '_' || c == '.' {
            c
        } else {
            continue;
        };

        if next == '-' {
            pending_hyphen = true;
            continue;
        }
        if pending_hyphen && !out.is_empty() {
            out.push('-');
        }
        pending_hyphen = false;
        out.push(next);
    }
    out
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary.
pub(crate) fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
