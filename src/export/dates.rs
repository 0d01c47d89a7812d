//! Health-date parsing
//!
//! The export writes instants as `YYYY-MM-DD HH:MM:SS ±HHMM` (space-separated
//! fields, zone offset without a colon). chrono's `%z` accepts the colon-free
//! offset directly; anything else falls back to RFC 3339 before giving up.

use chrono::{DateTime, FixedOffset};

const HEALTH_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Parse a health-export date string into a zone-explicit instant.
///
/// Unparseable or empty strings yield `None`; the owning record is dropped
/// by its extractor.
pub fn parse_health_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_str(raw, HEALTH_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}
