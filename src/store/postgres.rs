use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{Store, StoreStats};
use crate::error::Result;
use crate::schema::DetectionRecord;

/// Networked backend. No primary key on (id, t): duplicate ingestion is
/// tolerated by design and surfaces in the verifier's counts instead. Plain
/// indexes cover the natural-key lookup.
pub struct PostgresStore {
    pool: PgPool,
}

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS detections (
        id TEXT NOT NULL,
        class TEXT NOT NULL,
        t TIMESTAMPTZ NOT NULL,
        x DOUBLE PRECISION NOT NULL,
        y DOUBLE PRECISION NOT NULL,
        heading DOUBLE PRECISION,
        vest INTEGER,
        speed DOUBLE PRECISION,
        area TEXT,
        with_object BOOLEAN
    )";

const CREATE_INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_detections_t ON detections(t)",
    "CREATE INDEX IF NOT EXISTS idx_detections_class ON detections(class)",
    "CREATE INDEX IF NOT EXISTS idx_detections_area ON detections(area)",
    "CREATE INDEX IF NOT EXISTS idx_detections_id_t ON detections(id, t)",
];

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(8).connect(url).await?;
        debug!("Connected to PostgreSQL store");
        Ok(Self { pool })
    }

    /// Runs DDL, swallowing duplicate-object errors so concurrent first runs
    /// cannot race each other between IF NOT EXISTS checks.
    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        match sqlx::query(sql).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_object(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_duplicate_object(e: &sqlx::Error) -> bool {
    // 42P07 duplicate_table, 42710 duplicate_object, 23505 unique_violation
    // (pg_type races during concurrent CREATE TABLE IF NOT EXISTS)
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("42P07") | Some("42710") | Some("23505"))
        }
        _ => false,
    }
}

#[async_trait]
impl Store for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn concurrent_writers(&self) -> usize {
        4
    }

    fn enforces_natural_key(&self) -> bool {
        false
    }

    async fn create_schema(&self) -> Result<()> {
        self.execute_ddl(CREATE_TABLE).await
    }

    async fn create_indexes(&self) -> Result<()> {
        for sql in CREATE_INDEXES {
            self.execute_ddl(sql).await?;
        }
        Ok(())
    }

    async fn drop_table(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS detections")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE detections")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn insert_batch(&self, records: &[DetectionRecord]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for r in records {
            let done = sqlx::query(
                "INSERT INTO detections
                     (id, class, t, x, y, heading, vest, speed, area, with_object)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(&r.id)
            .bind(&r.class)
            .bind(r.t)
            .bind(r.x)
            .bind(r.y)
            .bind(r.heading)
            .bind(r.vest.map(|v| v as i32))
            .bind(r.speed)
            .bind(&r.area)
            .bind(r.with_object)
            .execute(&mut *tx)
            .await?;
            inserted += done.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections")
            .fetch_one(&self.pool)
            .await?;
        let distinct: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT class) FROM detections")
            .fetch_one(&self.pool)
            .await?;
        let range = sqlx::query("SELECT MIN(t), MAX(t) FROM detections")
            .fetch_one(&self.pool)
            .await?;
        let min_t: Option<DateTime<Utc>> = range.try_get(0)?;
        let max_t: Option<DateTime<Utc>> = range.try_get(1)?;

        let rows = sqlx::query("SELECT class, COUNT(*) FROM detections GROUP BY class ORDER BY class")
            .fetch_all(&self.pool)
            .await?;
        let rows_per_class = rows
            .iter()
            .map(|row| {
                let class: String = row.try_get(0)?;
                let count: i64 = row.try_get(1)?;
                Ok::<_, sqlx::Error>((class, count as u64))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            total_rows: total as u64,
            distinct_classes: distinct as u64,
            min_t,
            max_t,
            rows_per_class,
        })
    }
}
