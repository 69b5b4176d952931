//! Time value normalization for time-range comparison.
//!
//! Absolute timestamps are compared by instant, regardless of how they were
//! written. Anything that does not parse as a timestamp is a relative
//! expression (`now`, `now-15m`, `now/d`) and is compared as written.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an absolute timestamp. Naive values are read in local time.
pub fn parse_absolute(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Canonical UTC rendering (`YYYY-MM-DDTHH:mm:ss.SSSZ`) or the raw string.
pub fn to_utc_string(value: &str) -> String {
    match parse_absolute(value) {
        Some(instant) => instant.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => value.to_string(),
    }
}

pub fn are_times_equal(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => to_utc_string(a) == to_utc_string(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_values_render_in_utc_millis() {
        assert_eq!(
            to_utc_string("2024-03-01T10:00:00+02:00"),
            "2024-03-01T08:00:00.000Z"
        );
        assert_eq!(
            to_utc_string("2024-03-01T08:00:00.5Z"),
            "2024-03-01T08:00:00.500Z"
        );
    }

    #[test]
    fn relative_expressions_are_kept_verbatim() {
        assert_eq!(to_utc_string("now-15m"), "now-15m");
        assert_eq!(to_utc_string("now/d"), "now/d");
        assert_eq!(to_utc_string(""), "");
    }

    #[test]
    fn same_instant_written_differently_is_equal() {
        assert!(are_times_equal(
            Some("2024-03-01T08:00:00Z"),
            Some("2024-03-01T10:00:00.000+02:00")
        ));
        assert!(are_times_equal(
            Some("Fri, 01 Mar 2024 08:00:00 +0000"),
            Some("2024-03-01T08:00:00.000Z")
        ));
    }

    #[test]
    fn relative_expressions_compare_by_raw_string() {
        assert!(are_times_equal(Some("now-15m"), Some("now-15m")));
        assert!(!are_times_equal(Some("now-15m"), Some("now-900s")));
        assert!(!are_times_equal(Some("now"), Some("2024-03-01T08:00:00Z")));
    }

    #[test]
    fn absent_only_equals_absent() {
        assert!(are_times_equal(None, None));
        assert!(!are_times_equal(Some("now"), None));
    }
}
