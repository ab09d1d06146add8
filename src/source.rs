use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::info;

use crate::error::{Result, SeedError};

/// The raw CSV contents: one header row plus every data row, untyped.
/// Short rows are tolerated here; the validator rejects them field by field.
#[derive(Debug)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads the whole source file up front. The pipeline is batch-oriented, not
/// streaming, so every later stage sees the full input.
pub fn read_csv(path: &Path) -> Result<RawTable> {
    if !path.is_file() {
        return Err(SeedError::Input(format!(
            "source file not found: {}",
            path.display()
        )));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(SeedError::Input(format!(
            "source file has no header row: {}",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?);
    }
    if rows.is_empty() {
        return Err(SeedError::Input(format!(
            "source file contains no data rows: {}",
            path.display()
        )));
    }

    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_headers_and_rows() {
        let file = write_temp("id,class,t,x,y\na1,ped,1700000000,1.0,2.0\n");
        let table = read_csv(file.path()).unwrap();
        assert_eq!(table.headers, vec!["id", "class", "t", "x", "y"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = read_csv(Path::new("/nonexistent/input.csv")).unwrap_err();
        assert!(matches!(err, SeedError::Input(_)));
    }

    #[test]
    fn header_only_file_is_input_error() {
        let file = write_temp("id,class,t,x,y\n");
        let err = read_csv(file.path()).unwrap_err();
        assert!(matches!(err, SeedError::Input(_)));
    }

    #[test]
    fn empty_file_is_input_error() {
        let file = write_temp("");
        let err = read_csv(file.path()).unwrap_err();
        assert!(matches!(err, SeedError::Input(_)));
    }
}
