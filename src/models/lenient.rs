//! Lenient field parsing for scraper output.
//!
//! Scraped pages report engagement as display text ("1,234 Likes") and
//! timestamps with or without an offset. These helpers accept what the page
//! gave and fall back to zero or `None` rather than rejecting the record.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::LazyLock;

static COUNT_DIGITS: LazyLock<Regex> = lazy_regex!(r"(\d[\d,]*)");

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Extracts the first digit run from engagement text.
///
/// Thousands separators are dropped. Text without digits, or a run too large
/// for `i64`, yields 0.
///
/// ```rust
/// use tagsignal::models::parse_count_text;
///
/// assert_eq!(parse_count_text("1,234 Likes"), 1234);
/// assert_eq!(parse_count_text("Reply"), 0);
/// ```
#[must_use]
pub fn parse_count_text(text: &str) -> i64 {
    COUNT_DIGITS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0)
}

/// Parses an RFC 3339 timestamp, or a naive ISO timestamp taken as UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Deserializes an engagement count from a number, display text or null.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn deserialize_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<CountRepr>::deserialize(deserializer)?;
    Ok(match repr {
        None => 0,
        Some(CountRepr::Int(n)) => n,
        Some(CountRepr::Float(f)) if f.is_finite() => f as i64,
        Some(CountRepr::Float(_)) => 0,
        Some(CountRepr::Text(s)) => parse_count_text(&s),
    })
}

/// Deserializes an optional timestamp, treating unparsable text as absent.
pub(crate) fn deserialize_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Deserializes an optional string, treating blank text as absent.
pub(crate) fn deserialize_non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.trim().is_empty()))
}
