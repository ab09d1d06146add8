use tracing::{info, warn};

use crate::store::{Store, StoreStats};

/// Post-load sanity checks: total rows, distinct classes, time range, and a
/// per-class breakdown. Read-only; a failure here is reported as a warning
/// and never affects the committed load.
pub async fn verify(store: &dyn Store) -> Option<StoreStats> {
    match store.stats().await {
        Ok(stats) => {
            info!(
                "Verified {} backend: {} rows, {} distinct classes, time range {:?}..{:?}",
                store.backend_name(),
                stats.total_rows,
                stats.distinct_classes,
                stats.min_t,
                stats.max_t,
            );
            Some(stats)
        }
        Err(e) => {
            warn!("Post-load verification failed: {e}");
            None
        }
    }
}
