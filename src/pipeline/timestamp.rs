use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Numeric timestamp columns whose maximum exceeds this are epoch
/// milliseconds; at or below it they are epoch seconds.
const EPOCH_MILLIS_CUTOFF: f64 = 10_000_000_000.0;

/// Formats tried, in order, for textual timestamps without an explicit zone.
/// UTC is assumed.
const TEXT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// How a timestamp column's raw values are encoded. Decided once per column,
/// never per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeEncoding {
    EpochSeconds,
    EpochMillis,
    Text,
}

/// Inspects every value in the raw timestamp column to pick an encoding.
/// A column qualifies as numeric only when every non-empty value parses as a
/// number; a single textual entry makes the whole column textual.
pub fn detect_encoding<'a, I>(values: I) -> TimeEncoding
where
    I: IntoIterator<Item = &'a str>,
{
    let mut max: Option<f64> = None;
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match value.parse::<f64>() {
            Ok(n) => max = Some(max.map_or(n, |m| m.max(n))),
            Err(_) => return TimeEncoding::Text,
        }
    }
    match max {
        Some(m) if m > EPOCH_MILLIS_CUTOFF => TimeEncoding::EpochMillis,
        _ => TimeEncoding::EpochSeconds,
    }
}

/// Converts one raw value to a UTC instant under the column's encoding.
/// Returns None for values that do not parse; the validator turns that into
/// a per-row rejection rather than a run failure.
pub fn normalize(value: &str, encoding: TimeEncoding) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    match encoding {
        TimeEncoding::EpochMillis => from_epoch(value.parse::<f64>().ok()?, true),
        TimeEncoding::EpochSeconds => from_epoch(value.parse::<f64>().ok()?, false),
        TimeEncoding::Text => parse_text(value),
    }
}

fn from_epoch(n: f64, millis: bool) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    if millis {
        DateTime::from_timestamp_millis(n.round() as i64)
    } else {
        // Fractional second-epochs keep microsecond precision
        DateTime::from_timestamp_micros((n * 1_000_000.0).round() as i64)
    }
}

fn parse_text(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in TEXT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    // A numeric entry stranded in an otherwise-textual column still gets the
    // epoch treatment, scaled per value since there is no column consensus.
    let n = value.parse::<f64>().ok()?;
    from_epoch(n, n > EPOCH_MILLIS_CUTOFF)
}
