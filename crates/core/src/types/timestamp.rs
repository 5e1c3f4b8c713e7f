//! Parsing of record store timestamps.
//!
//! The store returns `created`/`updated` as `2025-01-31 09:15:00.123Z`, while
//! reminder times arrive from HTML `datetime-local` inputs (`2025-01-31T09:15`)
//! or as RFC 3339. Values without an offset are taken to be UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Naive formats accepted after RFC 3339 fails, tried in order.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Errors that can occur when parsing a timestamp.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The value is empty.
    #[error("timestamp is empty")]
    Empty,
    /// The value matches none of the accepted formats.
    #[error("unrecognized timestamp: {0:?}")]
    Unrecognized(String),
}

/// Parse a timestamp in any accepted format, returning UTC.
///
/// # Errors
///
/// Returns [`TimestampError`] for empty or unrecognized input.
///
/// ```
/// use rbl_core::parse_utc_timestamp;
///
/// let a = parse_utc_timestamp("2025-03-01T10:00").unwrap();
/// let b = parse_utc_timestamp("2025-03-01 10:00:00.000Z").unwrap();
/// let c = parse_utc_timestamp("2025-03-01T15:45:00+05:45").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a, c);
/// ```
pub fn parse_utc_timestamp(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TimestampError::Empty);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| TimestampError::Unrecognized(value.to_string()))
}

/// Convert a wall-clock time entered at a fixed UTC offset into UTC.
///
/// Used for reminder forms that submit local time without a zone.
///
/// # Errors
///
/// Returns [`TimestampError`] if the value is not a recognized naive timestamp.
pub fn local_to_utc(value: &str, offset: FixedOffset) -> Result<DateTime<Utc>, TimestampError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TimestampError::Empty);
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| TimestampError::Unrecognized(value.to_string()))
}

/// Format a timestamp the way reminder records store it (`%Y-%m-%dT%H:%M`).
#[must_use]
pub fn format_minutes(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_naive_is_utc() {
        let parsed = parse_utc_timestamp("2025-06-01T08:30").unwrap();
        assert_eq!(parsed.hour(), 8);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn test_parse_store_format() {
        let parsed = parse_utc_timestamp("2024-12-31 23:59:59.999Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-12-31T23:59:59.999+00:00");
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let parsed = parse_utc_timestamp("2025-01-01T05:45:00+05:45").unwrap();
        assert_eq!(parsed.hour(), 0);
        assert_eq!(parsed.minute(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_utc_timestamp(""), Err(TimestampError::Empty));
        assert!(matches!(
            parse_utc_timestamp("tomorrow"),
            Err(TimestampError::Unrecognized(_))
        ));
        assert!(parse_utc_timestamp("2025-13-01T00:00").is_err());
    }

    #[test]
    fn test_local_to_utc_nepal() {
        let nepal = FixedOffset::east_opt(5 * 3600 + 45 * 60).unwrap();
        let utc = local_to_utc("2025-03-10T09:00", nepal).unwrap();
        assert_eq!(format_minutes(utc), "2025-03-10T03:15");
    }

    #[test]
    fn test_local_to_utc_crosses_midnight() {
        let nepal = FixedOffset::east_opt(5 * 3600 + 45 * 60).unwrap();
        let utc = local_to_utc("2025-03-10T02:00", nepal).unwrap();
        assert_eq!(format_minutes(utc), "2025-03-09T20:15");
    }
}
