//! Timestamp normalization across the backend's two encodings.
//!
//! Device records carry either ISO-8601 instants or the sentinel form
//! `YYYY-MM-DD_HH-MM-SS`. Both collapse to a `DateTime<Utc>` here. Nothing in
//! this module fails: an unparsable input is `None` from [`parse`], and the
//! callers pick their fallback ([`normalize_or`] for ordering, [`display`] for
//! rendering).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

pub const NO_DATA: &str = "No data available";
pub const INVALID_DATE: &str = "Invalid date";

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SENTINEL_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Parse either encoding into an instant. Sentinel components are read as UTC.
pub fn parse(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('_') {
        parse_sentinel(raw)
    } else {
        parse_iso(raw)
    }
}

/// Parse, falling back to `fallback` (usually "now") on missing or bad input.
pub fn normalize_or(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    parse(raw).unwrap_or(fallback)
}

/// Parse, falling back to the current wall-clock time.
pub fn normalize(raw: Option<&str>) -> DateTime<Utc> {
    normalize_or(raw, Utc::now())
}

/// Render for display, using the sentinel strings for missing or bad input.
pub fn display(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => NO_DATA.to_string(),
        Some(value) => match parse(Some(value)) {
            Some(instant) => instant.format(DISPLAY_FORMAT).to_string(),
            None => INVALID_DATE.to_string(),
        },
    }
}

/// Encode an instant in the sentinel format used as history keys.
pub fn to_sentinel(instant: DateTime<Utc>) -> String {
    instant.format(SENTINEL_FORMAT).to_string()
}

fn parse_sentinel(raw: &str) -> Option<DateTime<Utc>> {
    let (date_part, time_part) = raw.split_once('_')?;

    let mut date = date_part.split('-').map(|part| part.trim().parse::<u32>().ok());
    let year = i32::try_from(date.next()??).ok()?;
    let month = date.next()??;
    let day = date.next()??;

    let mut time = time_part.split('-').map(|part| part.trim().parse::<u32>().ok());
    let hour = time.next()??;
    let minute = time.next()??;
    let second = match time.next() {
        Some(second) => second?,
        None => 0,
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }
    // Offset-less forms are taken as UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sentinel_format() {
        let parsed = parse(Some("2025-01-01_10-30-05")).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 1, 10, 30, 5).unwrap());
    }

    #[test]
    fn test_sentinel_without_seconds() {
        let parsed = parse(Some("2025-03-09_07-45")).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 9, 7, 45, 0).unwrap());
    }

    #[test]
    fn test_iso_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse(Some("2025-01-01T10:00:00Z")), Some(expected));
        assert_eq!(parse(Some("2025-01-01T12:00:00+02:00")), Some(expected));
        assert_eq!(parse(Some("2025-01-01T10:00:00.000")), Some(expected));
        assert_eq!(
            parse(Some("2025-01-01")),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_malformed_falls_back() {
        let fallback = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();

        for raw in [None, Some(""), Some("   "), Some("garbage"), Some("2025-13-01_10-00-00"), Some("a_b")] {
            assert_eq!(normalize_or(raw, fallback), fallback, "input {raw:?}");
        }
    }

    #[test]
    fn test_display_sentinels() {
        assert_eq!(display(None), NO_DATA);
        assert_eq!(display(Some("")), NO_DATA);
        assert_eq!(display(Some("not a date")), INVALID_DATE);
        assert_eq!(display(Some("2025-01-01_09-05-00")), "2025-01-01 09:05:00");
    }

    #[test]
    fn test_sentinel_encoding_sorts_chronologically() {
        let earlier = to_sentinel(Utc.with_ymd_and_hms(2025, 1, 1, 9, 59, 59).unwrap());
        let later = to_sentinel(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        assert!(earlier < later);
        assert_eq!(later, "2025-01-01_10-00-00");
    }
}

/// Property-based tests using proptest
#[cfg(test)]
mod proptest_tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    proptest! {
        /// Sentinel strings decode to the instant built from their six components
        #[test]
        fn sentinel_round_trip(
            year in 1970i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
            hour in 0u32..24,
            minute in 0u32..60,
            second in 0u32..60,
        ) {
            let raw = format!("{year:04}-{month:02}-{day:02}_{hour:02}-{minute:02}-{second:02}");
            let expected = Utc.with_ymd_and_hms(year, month, day, hour, minute, second).unwrap();
            prop_assert_eq!(parse(Some(&raw)), Some(expected));
            prop_assert_eq!(to_sentinel(expected), raw);
        }

        /// Arbitrary input never panics and always yields an instant
        #[test]
        fn arbitrary_input_never_panics(raw in ".*") {
            let fallback = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
            let normalized = normalize_or(Some(raw.as_str()), fallback);
            match parse(Some(raw.as_str())) {
                Some(instant) => prop_assert_eq!(normalized, instant),
                None => prop_assert_eq!(normalized, fallback),
            }
            prop_assert!(!display(Some(&raw)).is_empty());
        }
    }
}
