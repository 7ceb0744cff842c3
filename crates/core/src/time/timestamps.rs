use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses the timestamp shapes the ESG API has been observed to emit.
///
/// Offsets are honoured when present; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Short month/year axis label, e.g. `Jan 24`.
pub fn month_label(ts: DateTime<Utc>) -> String {
    ts.format("%b %y").to_string()
}

/// `YYYY-MM-DD` label used by the per-company report charts.
pub fn day_label(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Every `YYYY-MM` from January of `start_year` through December of `end_year`.
pub fn monthly_periods(start_year: i32, end_year: i32) -> Vec<String> {
    let mut out = Vec::new();
    for year in start_year..=end_year {
        for month in 1..=12u32 {
            out.push(format!("{year}-{month:02}"));
        }
    }
    out
}
