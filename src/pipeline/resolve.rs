use std::collections::HashMap;

use crate::error::{Result, SeedError};
use crate::schema::{CLASS_ALIASES, OPTIONAL_COLUMNS, TIMESTAMP_CANDIDATES};

/// Mapping from canonical field name to source column index, produced once
/// per run from the header row. Pure function of the headers.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub id: usize,
    pub class: usize,
    pub timestamp: usize,
    /// Header the timestamp column was resolved from (t/timestamp/time).
    pub timestamp_source: String,
    pub x: usize,
    pub y: usize,
    /// Optional canonical columns present in this input.
    pub optional: HashMap<&'static str, usize>,
}

impl ColumnMap {
    pub fn optional_index(&self, name: &str) -> Option<usize> {
        self.optional.get(name).copied()
    }
}

/// Resolves raw input headers against the canonical detections schema.
///
/// The timestamp column is the first of `t`, `timestamp`, `time` present.
/// `class` resolves to a literal `class` header, or failing that the first
/// of `class_name`, `label`, `type` (case-insensitive) in that order. All
/// remaining canonical fields match by exact name.
pub fn resolve_columns(headers: &[String]) -> Result<ColumnMap> {
    let find = |name: &str| headers.iter().position(|h| h == name);

    let (timestamp, timestamp_source) = TIMESTAMP_CANDIDATES
        .iter()
        .find_map(|cand| find(cand).map(|i| (i, cand.to_string())))
        .ok_or_else(|| {
            SeedError::Schema(
                "no timestamp column found (expected one of t/timestamp/time)".to_string(),
            )
        })?;

    let class = find("class")
        .or_else(|| {
            CLASS_ALIASES
                .iter()
                .find_map(|alias| headers.iter().position(|h| h.eq_ignore_ascii_case(alias)))
        })
        .ok_or_else(|| {
            SeedError::Schema(
                "missing required column: class (or one of class_name/label/type)".to_string(),
            )
        })?;

    let required = |name: &str| {
        find(name).ok_or_else(|| SeedError::Schema(format!("missing required column: {name}")))
    };

    let mut optional = HashMap::new();
    for name in OPTIONAL_COLUMNS {
        if let Some(index) = find(name) {
            optional.insert(name, index);
        }
    }

    Ok(ColumnMap {
        id: required("id")?,
        class,
        timestamp,
        timestamp_source,
        x: required("x")?,
        y: required("y")?,
        optional,
    })
}
