/// Timestamps in audit traces are integer milliseconds since the Unix epoch, UTC, and all the
/// arithmetic on them is plain integer arithmetic.  chrono is used only at the edges: for turning
/// user input into timestamps and timestamps into something a human can read.
use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::str::FromStr;

/// Milliseconds since the epoch.

pub type Timestamp = i64;

/// A signed difference between two Timestamps, in milliseconds.

pub type TimeDelta = i64;

/// Format as an ISO 8601 UTC time with millisecond precision.  Values chrono can't represent are
/// printed as the raw number so that nothing is ever lost in the output.

pub fn format_timestamp(t: Timestamp) -> String {
    match Utc.timestamp_millis_opt(t).single() {
        Some(d) => d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => t.to_string(),
    }
}

/// Like format_timestamp, but shorter: UTC to the second, without the zone, for tabular output.

pub fn format_utc_short(t: Timestamp) -> String {
    match Utc.timestamp_millis_opt(t).single() {
        Some(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => t.to_string(),
    }
}

/// Parse a timestamp given by a user.  Accepted forms are an integer (epoch milliseconds, as in
/// the trace files), YYYY-MM-DD (midnight UTC), and RFC 3339.

pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    if let Ok(n) = i64::from_str(s) {
        return Ok(n);
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Ok(d.timestamp_millis());
    }
    let parts = s.split('-').map(u32::from_str).collect::<Vec<_>>();
    if parts.len() != 3 || !parts.iter().all(|x| x.is_ok()) {
        bail!("Invalid time syntax");
    }
    let vals = parts
        .into_iter()
        .map(|x| x.unwrap_or_default())
        .collect::<Vec<u32>>();
    let Some(d) = NaiveDate::from_ymd_opt(vals[0] as i32, vals[1], vals[2]) else {
        bail!("Invalid date")
    };
    let Some(midnight) = d.and_hms_opt(0, 0, 0) else {
        bail!("Invalid date")
    };
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

/// Parse a duration given by a user, in milliseconds.  A bare number is milliseconds; the
/// suffixes `ms`, `s`, `m` and `h` are also understood.

pub fn parse_duration(s: &str) -> Result<TimeDelta> {
    let (digits, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60 * 1000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60 * 1000)
    } else {
        (s, 1)
    };
    let Ok(n) = u64::from_str(digits) else {
        bail!("Bad duration")
    };
    match TimeDelta::try_from(n).ok().and_then(|n| n.checked_mul(scale)) {
        Some(ms) => Ok(ms),
        None => bail!("Duration out of range"),
    }
}

#[test]
fn test_parse_timestamp() {
    assert!(parse_timestamp("1357000000123").unwrap() == 1357000000123);
    assert!(parse_timestamp("-5").unwrap() == -5);
    assert!(parse_timestamp("1970-01-02").unwrap() == 24 * 60 * 60 * 1000);
    assert!(parse_timestamp("1970-01-01T00:00:01.500Z").unwrap() == 1500);
    assert!(parse_timestamp("1970-13-01").is_err());
    assert!(parse_timestamp("yesterday").is_err());
}

#[test]
fn test_parse_duration() {
    assert!(parse_duration("250").unwrap() == 250);
    assert!(parse_duration("250ms").unwrap() == 250);
    assert!(parse_duration("3s").unwrap() == 3000);
    assert!(parse_duration("2m").unwrap() == 120_000);
    assert!(parse_duration("1h").unwrap() == 3_600_000);
    assert!(parse_duration("h").is_err());
    assert!(parse_duration("-3s").is_err());
    assert!(parse_duration("18446744073709551615").is_err());
    assert!(parse_duration("9223372036854775807h").is_err());
    assert!(parse_duration("9223372036854775807").unwrap() == i64::MAX);
}

#[test]
fn test_format_timestamp() {
    assert!(format_timestamp(1500) == "1970-01-01T00:00:01.500Z");
    assert!(format_utc_short(61_000) == "1970-01-01 00:01:01");
    assert!(format_timestamp(i64::MAX) == i64::MAX.to_string());
}
