//! Formatting helpers for printing headlines in a terminal.

use std::borrow::Cow;

use chrono::{DateTime, Local};

/// Ellipsis string used for truncation
const ELLIPSIS: &str = "...";

/// Render an API `publishedAt` value in local time as `YYYY-MM-DD HH:MM`.
///
/// Values that are not RFC 3339 are returned as-is; an empty value renders as
/// `"unknown date"`.
///
/// # Examples
///
/// ```
/// use newsdesk::util::format_published;
///
/// assert_eq!(format_published(""), "unknown date");
/// assert_eq!(format_published("yesterday"), "yesterday");
/// ```
pub fn format_published(published_at: &str) -> Cow<'_, str> {
    if published_at.trim().is_empty() {
        return Cow::Borrowed("unknown date");
    }
    match DateTime::parse_from_rfc3339(published_at) {
        Ok(ts) => Cow::Owned(
            ts.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
        ),
        Err(_) => Cow::Borrowed(published_at),
    }
}

/// Truncate `s` to at most `max_chars` characters, ending in "..." when cut.
///
/// # Examples
///
/// ```
/// use newsdesk::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("A rather long headline", 10), "A rathe...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    if max_chars <= ELLIPSIS.len() {
        return Cow::Owned(s.chars().take(max_chars).collect());
    }
    let kept: String = s.chars().take(max_chars - ELLIPSIS.len()).collect();
    Cow::Owned(kept + ELLIPSIS)
}
