use chrono::{DateTime, NaiveDateTime, Utc};

/// `20261018_142501` style stamp used in log file names.
pub fn file_stamp(t: NaiveDateTime) -> String {
    t.format("%Y%m%d_%H%M%S").to_string()
}

/// Parses an ISO 8601 read start time into unix seconds. Times without an
/// offset are taken as UTC.
pub fn parse_iso8601(s: &str) -> Option<f64> {
    let s = s.trim();
    let dt = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|naive| naive.and_utc())
        })
        .ok()?;
    Some(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9)
}
