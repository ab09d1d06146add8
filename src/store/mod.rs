use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::schema::DetectionRecord;

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Aggregate figures the verifier reads back after a load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_rows: u64,
    pub distinct_classes: u64,
    pub min_t: Option<DateTime<Utc>>,
    pub max_t: Option<DateTime<Utc>>,
    /// Row counts per class, ordered by class name.
    pub rows_per_class: Vec<(String, u64)>,
}

/// Capability surface the pipeline needs from a relational backend. The
/// normalization and validation stages are backend-agnostic; only the loader
/// and verifier touch this trait.
#[async_trait]
pub trait Store: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// How many batches the loader may submit concurrently. 1 serializes.
    fn concurrent_writers(&self) -> usize;

    /// Whether the backend rejects duplicate (id, t) pairs on insert.
    fn enforces_natural_key(&self) -> bool;

    /// Creates the detections table. Idempotent and safe under concurrent
    /// first-run races.
    async fn create_schema(&self) -> Result<()>;

    /// Creates the t/class/area and (id, t) indexes. Idempotent.
    async fn create_indexes(&self) -> Result<()>;

    async fn drop_table(&self) -> Result<()>;

    async fn truncate(&self) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Inserts one batch inside a single transaction, returning the number
    /// of rows actually inserted. Backends that enforce the natural key may
    /// report fewer rows than submitted; the difference is duplicates.
    async fn insert_batch(&self, records: &[DetectionRecord]) -> Result<usize>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Opens the backend implied by the target string: postgres:// URLs get the
/// networked store, anything else is treated as a SQLite file path.
pub async fn open(target: &str) -> Result<Arc<dyn Store>> {
    if is_postgres_target(target) {
        Ok(Arc::new(PostgresStore::connect(target).await?))
    } else {
        Ok(Arc::new(SqliteStore::open(Path::new(target))?))
    }
}

pub fn is_postgres_target(target: &str) -> bool {
    target.starts_with("postgres://") || target.starts_with("postgresql://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_dispatch_recognizes_postgres_urls() {
        assert!(is_postgres_target("postgres://user:pw@localhost/detections"));
        assert!(is_postgres_target("postgresql://localhost/detections"));
        assert!(!is_postgres_target("detections.sqlite"));
        assert!(!is_postgres_target("/var/data/detections.db"));
    }
}
