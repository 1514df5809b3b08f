//! Revision timestamps (`REV`).
//!
//! Documents carry their revision as a compact UTC timestamp
//! (`20240201T120000Z`). Extended ISO-8601 and RFC 3339 forms are accepted
//! on read; timestamps without an offset are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{CodecError, Result};

const COMPACT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn parse_revision(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let invalid = || CodecError::InvalidRevision(raw.to_string());

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, COMPACT_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y%m%dT%H%M%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(invalid())
}

pub fn format_revision(at: DateTime<Utc>) -> String {
    at.format(COMPACT_FORMAT).to_string()
}

/// Whether an incoming record should replace the existing document.
///
/// Only a strictly later incoming revision wins. A missing or unparseable
/// revision on either side means the order is unknown and nothing is
/// replaced.
pub fn should_update(incoming: Option<&str>, existing: Option<&str>) -> bool {
    let (Some(incoming), Some(existing)) = (incoming, existing) else {
        return false;
    };
    match (parse_revision(incoming), parse_revision(existing)) {
        (Ok(incoming), Ok(existing)) => incoming > existing,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_revision_wins() {
        assert!(should_update(Some("20240201T120000Z"), Some("20240101T120000Z")));
        assert!(!should_update(Some("20240101T120000Z"), Some("20240201T120000Z")));
        assert!(!should_update(Some("20240101T120000Z"), Some("20240101T120000Z")));
    }

    #[test]
    fn test_missing_or_invalid_never_updates() {
        assert!(!should_update(None, Some("20240101T120000Z")));
        assert!(!should_update(Some("20240101T120000Z"), None));
        assert!(!should_update(Some("yesterday"), Some("20240101T120000Z")));
    }

    #[test]
    fn test_mixed_formats_compare() {
        assert!(should_update(Some("2024-02-01T12:00:00+00:00"), Some("20240201T115959Z")));
        assert!(!should_update(Some("2024-02-01T13:00:00+02:00"), Some("20240201T120000Z")));
    }

    #[test]
    fn test_accepted_forms_format_compact() {
        let compact = |raw: &str| parse_revision(raw).map(format_revision);
        assert_eq!(compact("2024-03-05T06:07:08Z").unwrap(), "20240305T060708Z");
        assert_eq!(compact("2024-03-05").unwrap(), "20240305T000000Z");
        assert!(matches!(compact("not a date"), Err(CodecError::InvalidRevision(_))));
    }
}
