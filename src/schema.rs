use chrono::{DateTime, Utc};
use serde::Serialize;

/// Name of the target table all input variants are normalized into.
pub const DETECTIONS_TABLE: &str = "detections";

/// Timestamp source columns, scanned in priority order; first match wins.
pub const TIMESTAMP_CANDIDATES: [&str; 3] = ["t", "timestamp", "time"];

/// Case-insensitive aliases for the `class` column, in resolution priority
/// order. A literal `class` header always wins over any alias.
pub const CLASS_ALIASES: [&str; 3] = ["class_name", "label", "type"];

/// Optional canonical columns, matched by exact name. Absence is tolerated.
pub const OPTIONAL_COLUMNS: [&str; 5] = ["heading", "speed", "vest", "area", "with_object"];

/// One validated detection, ready for the loader. Built from a single raw
/// CSV row, written once, never mutated afterwards. `(id, t)` is the natural
/// key in the target store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub id: String,
    pub class: String,
    pub t: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub vest: Option<i64>,
    pub area: Option<String>,
    pub with_object: Option<bool>,
}
