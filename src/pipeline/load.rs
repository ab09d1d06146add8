use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ExistingDataPolicy, LoadMode};
use crate::error::{Result, SeedError};
use crate::schema::DetectionRecord;
use crate::store::Store;

/// Attempts per batch before the load gives up on it.
const MAX_ATTEMPTS: u32 = 3;
/// Delay before a retry, multiplied by the attempt number.
const RETRY_DELAY: Duration = Duration::from_millis(250);
/// Upper bound on a single insert attempt.
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Cap on concurrently in-flight batches for multi-writer backends.
const MAX_WORKERS: usize = 4;

/// The batch that ended the load, by input row range, so a re-run can target
/// only unloaded data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub first_row: usize,
    pub last_row: usize,
    pub attempts: u32,
    pub message: String,
}

/// What the loader actually committed. A failure loses at most one batch's
/// worth of data; everything counted here is durably stored.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadOutcome {
    pub batches_committed: usize,
    pub rows_loaded: usize,
    /// Rows the backend skipped as natural-key duplicates.
    pub duplicates_skipped: usize,
    pub failure: Option<BatchFailure>,
    pub cancelled: bool,
}

/// Writes validated records to the target store in bounded batches, one
/// transaction per batch. Batches go in parallel up to a bounded worker
/// count when the backend tolerates concurrent writers; SQLite serializes.
pub struct BatchLoader {
    store: Arc<dyn Store>,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn Store>, batch_size: usize, cancel: Arc<AtomicBool>) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            cancel,
        }
    }

    /// Brings the target table to a loadable state. Replace mode drops and
    /// recreates the table unconditionally; the existing-data policy applies
    /// to append mode, where it can fail before any write.
    pub async fn prepare(&self, mode: LoadMode, policy: ExistingDataPolicy) -> Result<()> {
        if mode == LoadMode::Replace {
            self.store.drop_table().await?;
        }
        self.store.create_schema().await?;
        self.store.create_indexes().await?;

        if mode == LoadMode::Append {
            let existing = self.store.count().await?;
            if existing > 0 {
                match policy {
                    ExistingDataPolicy::Fail => {
                        return Err(SeedError::store(format!(
                            "target already contains {existing} rows \
                             (rerun with --if-exists truncate or --if-exists append)"
                        )));
                    }
                    ExistingDataPolicy::Truncate => {
                        warn!("Clearing {existing} existing rows before load");
                        self.store.truncate().await?;
                    }
                    ExistingDataPolicy::Append => {
                        info!("Appending to {existing} existing rows");
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn load(&self, records: Vec<DetectionRecord>) -> Result<LoadOutcome> {
        if records.is_empty() {
            return Ok(LoadOutcome::default());
        }

        let batch_count = records.len().div_ceil(self.batch_size);
        let mut batches = Vec::with_capacity(batch_count);
        let mut first_row = 0;
        let mut iter = records.into_iter().peekable();
        while iter.peek().is_some() {
            let batch: Vec<DetectionRecord> = iter.by_ref().take(self.batch_size).collect();
            let len = batch.len();
            batches.push((first_row, batch));
            first_row += len;
        }

        let workers = self.store.concurrent_writers().clamp(1, MAX_WORKERS);
        debug!(
            "Loading {batch_count} batches of up to {} rows ({} backend, {workers} writer(s))",
            self.batch_size,
            self.store.backend_name()
        );

        if workers == 1 {
            self.load_sequential(batches).await
        } else {
            self.load_parallel(batches, workers).await
        }
    }

    async fn load_sequential(
        &self,
        batches: Vec<(usize, Vec<DetectionRecord>)>,
    ) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();
        for (first_row, batch) in batches {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Cancellation requested; stopping before row {first_row}");
                outcome.cancelled = true;
                break;
            }
            let size = batch.len();
            match insert_with_retry(self.store.as_ref(), &batch, first_row).await {
                Ok(inserted) => {
                    outcome.batches_committed += 1;
                    outcome.rows_loaded += inserted;
                    outcome.duplicates_skipped += size - inserted;
                    debug!("Committed rows {first_row}..{}", first_row + size);
                }
                Err(failure) => {
                    outcome.failure = Some(failure);
                    break;
                }
            }
        }
        Ok(outcome)
    }

    async fn load_parallel(
        &self,
        batches: Vec<(usize, Vec<DetectionRecord>)>,
        workers: usize,
    ) -> Result<LoadOutcome> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut set: JoinSet<std::result::Result<(usize, usize), BatchFailure>> = JoinSet::new();
        // Failures raise this internal flag to stop submission; it stays
        // separate from the user-facing cancel signal.
        let stop = Arc::new(AtomicBool::new(false));
        let mut user_cancelled = false;

        for (first_row, batch) in batches {
            if self.cancel.load(Ordering::Relaxed) {
                warn!("Cancellation requested; not submitting batch at row {first_row}");
                user_cancelled = true;
                break;
            }
            if stop.load(Ordering::Relaxed) {
                debug!("Batch failure observed; not submitting batch at row {first_row}");
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SeedError::store(format!("loader semaphore closed: {e}")))?;
            let store = self.store.clone();
            let stop = stop.clone();
            set.spawn(async move {
                let _permit = permit;
                let size = batch.len();
                match insert_with_retry(store.as_ref(), &batch, first_row).await {
                    Ok(inserted) => Ok((size, inserted)),
                    Err(failure) => {
                        // Stop submission of further batches; in-flight ones
                        // finish or roll back on their own.
                        stop.store(true, Ordering::Relaxed);
                        Err(failure)
                    }
                }
            });
        }

        let mut outcome = LoadOutcome {
            cancelled: user_cancelled,
            ..LoadOutcome::default()
        };
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok((size, inserted))) => {
                    outcome.batches_committed += 1;
                    outcome.rows_loaded += inserted;
                    outcome.duplicates_skipped += size - inserted;
                }
                Ok(Err(failure)) => {
                    // Concurrent batches can fail in any completion order;
                    // report the earliest row range so a re-run knows where
                    // unloaded data starts.
                    let earlier = outcome
                        .failure
                        .as_ref()
                        .map_or(true, |existing| failure.first_row < existing.first_row);
                    if earlier {
                        outcome.failure = Some(failure);
                    }
                }
                Err(e) => {
                    return Err(SeedError::store(format!("loader task panicked: {e}")));
                }
            }
        }
        Ok(outcome)
    }
}

async fn insert_with_retry(
    store: &dyn Store,
    batch: &[DetectionRecord],
    first_row: usize,
) -> std::result::Result<usize, BatchFailure> {
    let last_row = first_row + batch.len() - 1;
    let mut attempt = 1;
    loop {
        let error = match tokio::time::timeout(BATCH_TIMEOUT, store.insert_batch(batch)).await {
            Ok(Ok(inserted)) => return Ok(inserted),
            Ok(Err(e)) => e,
            Err(_) => SeedError::Store {
                message: format!("batch insert timed out after {BATCH_TIMEOUT:?}"),
                transient: true,
            },
        };
        if attempt >= MAX_ATTEMPTS || !error.is_transient() {
            return Err(BatchFailure {
                first_row,
                last_row,
                attempts: attempt,
                message: error.to_string(),
            });
        }
        warn!("Batch rows {first_row}..={last_row} attempt {attempt} failed, retrying: {error}");
        tokio::time::sleep(RETRY_DELAY * attempt).await;
        attempt += 1;
    }
}
