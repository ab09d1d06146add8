use chrono::{DateTime, Utc};
use csv::StringRecord;
use serde::Serialize;

use crate::pipeline::resolve::ColumnMap;
use crate::schema::DetectionRecord;

/// Why a raw row was excluded from the load. Rejections are observability
/// signals, counted and summarized once per run, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    InvalidCoordinates,
    InvalidTimestamp,
}

/// Per-reason rejection counts for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RejectionTally {
    pub invalid_coordinates: usize,
    pub invalid_timestamp: usize,
}

impl RejectionTally {
    pub fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::InvalidCoordinates => self.invalid_coordinates += 1,
            RejectReason::InvalidTimestamp => self.invalid_timestamp += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.invalid_coordinates + self.invalid_timestamp
    }
}

/// Validates and cleans one raw row against the resolved column map,
/// producing either a loadable record or a rejection reason.
///
/// Numeric coercion failures yield a missing value for the field, not a row
/// rejection, except for `x`/`y` where a missing coordinate rejects the row.
/// The coordinate check runs before the timestamp check, so a row bad in
/// both counts under invalid coordinates.
pub fn validate_row(
    row: &StringRecord,
    columns: &ColumnMap,
    t: Option<DateTime<Utc>>,
) -> Result<DetectionRecord, RejectReason> {
    let x = coerce_f64(field(row, columns.x));
    let y = coerce_f64(field(row, columns.y));
    let (Some(x), Some(y)) = (x, y) else {
        return Err(RejectReason::InvalidCoordinates);
    };
    let Some(t) = t else {
        return Err(RejectReason::InvalidTimestamp);
    };

    let optional = |name: &str| columns.optional_index(name).and_then(|i| field(row, i));

    Ok(DetectionRecord {
        id: field(row, columns.id).unwrap_or_default().to_string(),
        class: field(row, columns.class).unwrap_or_default().to_string(),
        t,
        x,
        y,
        heading: coerce_f64(optional("heading")),
        speed: coerce_f64(optional("speed")),
        vest: coerce_i64(optional("vest")),
        area: coerce_area(optional("area")),
        with_object: coerce_bool(optional("with_object")),
    })
}

/// Trimmed field value; empty fields and short rows read as missing.
fn field<'a>(row: &'a StringRecord, index: usize) -> Option<&'a str> {
    row.get(index).map(str::trim).filter(|v| !v.is_empty())
}

fn coerce_f64(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn coerce_i64(value: Option<&str>) -> Option<i64> {
    let value = value?;
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

/// Literal "nan" placeholders from upstream exports normalize to missing.
fn coerce_area(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.eq_ignore_ascii_case("nan"))
        .map(str::to_string)
}

fn coerce_bool(value: Option<&str>) -> Option<bool> {
    match value?.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" => Some(false),
        _ => None,
    }
}
