//! Shared field parsing for the feed adapters.
//!
//! Open-data exports write dates as Socrata timestamps, plain ISO dates,
//! or US-style dates depending on how they were downloaded, and leave
//! numeric columns blank or as floats. These helpers accept all of them.

use chrono::{NaiveDate, NaiveDateTime};
use safety_map_geography_models::GeoPoint;

/// Parses a date from the formats the feeds are exported in.
///
/// Time-of-day components are dropped.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %I:%M:%S %p",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.date());
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

/// Parses an optional date field.
#[must_use]
pub fn parse_optional_date(s: Option<&str>) -> Option<NaiveDate> {
    s.and_then(parse_date)
}

/// Parses a coordinate from optional string fields. Returns `None` if
/// either value is missing, unparseable, out of range, or zero.
#[must_use]
pub fn parse_point(lat: Option<&str>, lng: Option<&str>) -> Option<GeoPoint> {
    let latitude = lat?.trim().parse::<f64>().ok();
    let longitude = lng?.trim().parse::<f64>().ok();
    GeoPoint::from_parts(latitude, longitude)
}

/// Parses a count column. Blank or unparseable values count as zero, and
/// float renderings such as `"2.0"` are accepted.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn parse_count(s: Option<&str>) -> u32 {
    let Some(s) = s.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };
    if let Ok(n) = s.parse::<u32>() {
        return n;
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f <= f64::from(u32::MAX) => f as u32,
        _ => 0,
    }
}

/// Trims a text field, mapping blanks to `None`.
#[must_use]
pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socrata_date_with_fractional() {
        let date = parse_date("2024-01-15T14:30:00.000").unwrap();
        assert_eq!(date.to_string(), "2024-01-15");
    }

    #[test]
    fn parses_plain_and_us_dates() {
        assert_eq!(parse_date("2021-06-30").unwrap().to_string(), "2021-06-30");
        assert_eq!(parse_date("06/30/2021").unwrap().to_string(), "2021-06-30");
        assert_eq!(
            parse_date("06/30/2021 03:15:00 PM").unwrap().to_string(),
            "2021-06-30"
        );
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(parse_date("not-a-date").is_none());
        assert!(parse_date("  ").is_none());
        assert!(parse_optional_date(None).is_none());
    }

    #[test]
    fn parses_point_strings() {
        let point = parse_point(Some("40.7128"), Some(" -73.8900")).unwrap();
        assert!((point.latitude - 40.7128).abs() < f64::EPSILON);
        assert!((point.longitude - -73.89).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_zero_missing_and_garbage_points() {
        assert!(parse_point(Some("0.0"), Some("-73.89")).is_none());
        assert!(parse_point(None, Some("-73.89")).is_none());
        assert!(parse_point(Some("40.71"), Some("n/a")).is_none());
        assert!(parse_point(Some("140.71"), Some("-73.89")).is_none());
    }

    #[test]
    fn counts_default_to_zero() {
        assert_eq!(parse_count(Some("3")), 3);
        assert_eq!(parse_count(Some("2.0")), 2);
        assert_eq!(parse_count(Some("")), 0);
        assert_eq!(parse_count(Some("-1")), 0);
        assert_eq!(parse_count(None), 0);
    }
}
