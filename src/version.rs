//! Cache-busting version parameter for avatar URLs.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::types::UpdatedAt;

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: f64 = 2e9;

/// ISO-8601 forms with an explicit offset that RFC 3339 rejects, such as Postgres `+00` or `+0000`.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];

/// Postgres `timestamp` columns render without an offset; read those as UTC.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

impl UpdatedAt {
    /// Whole epoch seconds, or `None` when the value cannot be read as a point in time.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn epoch_seconds(&self) -> Option<i64> {
        match self {
            UpdatedAt::Iso(raw) => parse_iso(raw.trim()),
            UpdatedAt::Epoch(value) => {
                if !value.is_finite() {
                    return None;
                }
                let seconds = if *value > MILLIS_THRESHOLD {
                    value / 1000.0
                } else {
                    *value
                };
                Some(seconds.floor() as i64)
            }
        }
    }
}

fn parse_iso(raw: &str) -> Option<i64> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp());
    }

    // A trailing `Z` is UTC; spell it as an offset so the permissive formats accept it.
    let zoned = raw
        .strip_suffix(['Z', 'z'])
        .map(|rest| format!("{rest}+00:00"));
    let candidate = zoned.as_deref().unwrap_or(raw);

    if let Some(parsed) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(candidate, format).ok())
    {
        return Some(parsed.timestamp());
    }

    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    {
        return Some(naive.and_utc().timestamp());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
}

/// Append `v=<epoch-seconds>` to `url` so image caches refetch after an avatar changes.
///
/// The URL comes back unchanged when the timestamp is absent, unparsable or zero.
#[must_use]
pub fn with_version(url: &str, updated_at: Option<&UpdatedAt>) -> String {
    let Some(seconds) = updated_at.and_then(UpdatedAt::epoch_seconds) else {
        return url.to_string();
    };
    if seconds == 0 {
        return url.to_string();
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}v={seconds}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_iso_timestamp() {
        let ts = UpdatedAt::from("2024-01-01T00:00:00Z");
        assert_eq!(
            with_version("https://x/y", Some(&ts)),
            "https://x/y?v=1704067200"
        );
        assert_eq!(
            with_version("https://x/y?a=1", Some(&ts)),
            "https://x/y?a=1&v=1704067200"
        );
    }

    #[test]
    fn stamping_is_repeatable() {
        let ts = UpdatedAt::from("2024-01-01T00:00:00+02:00");
        let first = with_version("https://x/y", Some(&ts));
        assert_eq!(first, with_version("https://x/y", Some(&ts)));
        assert_eq!(first, "https://x/y?v=1704060000");
    }

    #[test]
    fn reads_postgres_timestamp_without_offset() {
        let ts = UpdatedAt::from("2024-01-01 00:00:00.123456");
        assert_eq!(ts.epoch_seconds(), Some(1_704_067_200));
    }

    #[test]
    fn reads_other_iso_8601_forms() {
        for raw in [
            "2024-01-01",
            "2024-01-01T00:00",
            "2024-01-01T00:00Z",
            "2024-01-01 00:00Z",
            "2024-01-01 00:00:00+00",
            "2024-01-01T00:00:00.000+0000",
            "2024-01-01T02:00+02:00",
            "2024-01-01 00:00:00z",
        ] {
            assert_eq!(
                with_version("https://x/y", Some(&UpdatedAt::from(raw))),
                "https://x/y?v=1704067200",
                "timestamp {raw:?}"
            );
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        assert_eq!(UpdatedAt::from("2024-13-01").epoch_seconds(), None);
        assert_eq!(UpdatedAt::from("2024-01-01T25:00Z").epoch_seconds(), None);
        assert_eq!(UpdatedAt::from("").epoch_seconds(), None);
    }

    #[test]
    fn epoch_numbers_in_seconds_and_millis() {
        assert_eq!(UpdatedAt::from(1_704_067_200_i64).epoch_seconds(), Some(1_704_067_200));
        assert_eq!(
            UpdatedAt::from(1_704_067_200_500_i64).epoch_seconds(),
            Some(1_704_067_200)
        );
        assert_eq!(UpdatedAt::from(f64::NAN).epoch_seconds(), None);
    }

    #[test]
    fn leaves_url_alone_without_usable_timestamp() {
        assert_eq!(with_version("https://x/y", None), "https://x/y");
        assert_eq!(
            with_version("https://x/y", Some(&UpdatedAt::from("yesterday"))),
            "https://x/y"
        );
        assert_eq!(
            with_version("https://x/y", Some(&UpdatedAt::from(0_i64))),
            "https://x/y"
        );
    }
}
