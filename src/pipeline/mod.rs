use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SeedConfig;
use crate::error::Result;
use crate::source;
use crate::store::{self, StoreStats};

pub mod load;
pub mod resolve;
pub mod timestamp;
pub mod validate;
pub mod verify;

use load::{BatchFailure, BatchLoader};
use validate::RejectionTally;

/// One run's user-facing report: everything the operator needs to judge the
/// load without reading logs.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub backend: &'static str,
    pub rows_read: usize,
    pub rejections: RejectionTally,
    pub rows_loaded: usize,
    pub duplicates_skipped: usize,
    pub batches_committed: usize,
    /// Set when the load stopped early; committed batches stay persisted.
    pub failure: Option<BatchFailure>,
    pub cancelled: bool,
    pub verification: Option<StoreStats>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

/// Runs the full ingestion pipeline: read → resolve columns → normalize
/// timestamps → validate rows → batch load → verify.
///
/// Stages before loading are pure; any failure there returns an error with
/// no writes performed. A failure during loading is reported inside the
/// summary, leaving the store at exactly the batches committed so far.
pub async fn run(config: &SeedConfig, cancel: Arc<AtomicBool>) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    info!(run = %run_id, "Validating input {}", config.source.display());
    let table = source::read_csv(&config.source)?;

    info!(run = %run_id, "Resolving schema from {} headers", table.headers.len());
    let columns = resolve::resolve_columns(&table.headers)?;
    debug!(
        "Resolved timestamp column '{}' at index {}",
        columns.timestamp_source, columns.timestamp
    );

    info!(run = %run_id, "Normalizing timestamps and validating {} rows", table.len());
    let encoding = timestamp::detect_encoding(
        table
            .rows
            .iter()
            .map(|row| row.get(columns.timestamp).unwrap_or("")),
    );
    debug!("Timestamp column encoding: {encoding:?}");

    let mut tally = RejectionTally::default();
    let mut records = Vec::with_capacity(table.len());
    for row in &table.rows {
        let t = row
            .get(columns.timestamp)
            .and_then(|value| timestamp::normalize(value, encoding));
        match validate::validate_row(row, &columns, t) {
            Ok(record) => records.push(record),
            Err(reason) => tally.record(reason),
        }
    }
    if tally.total() > 0 {
        info!(
            "Rejected {} rows ({} invalid coordinates, {} invalid timestamps)",
            tally.total(),
            tally.invalid_coordinates,
            tally.invalid_timestamp
        );
    }

    let store = store::open(&config.target).await?;
    info!(
        run = %run_id,
        "Loading {} records into '{}' on {} target",
        records.len(),
        crate::schema::DETECTIONS_TABLE,
        store.backend_name()
    );
    let loader = BatchLoader::new(store.clone(), config.batch_size, cancel);
    loader.prepare(config.mode, config.if_exists).await?;
    let outcome = loader.load(records).await?;

    // The state machine skips verification when loading failed; the store is
    // left at the committed batches and the failure is reported as-is.
    let verification = if outcome.failure.is_none() {
        verify::verify(store.as_ref()).await
    } else {
        None
    };

    Ok(RunSummary {
        run_id,
        backend: store.backend_name(),
        rows_read: table.len(),
        rejections: tally,
        rows_loaded: outcome.rows_loaded,
        duplicates_skipped: outcome.duplicates_skipped,
        batches_committed: outcome.batches_committed,
        failure: outcome.failure,
        cancelled: outcome.cancelled,
        verification,
    })
}
