use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::{Store, StoreStats};
use crate::error::Result;
use crate::schema::DetectionRecord;

/// Embedded single-writer backend. `(id, t)` is the primary key, so the
/// engine itself rejects duplicate detections; appends use INSERT OR IGNORE
/// and report how many rows actually landed.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS detections (
        id TEXT NOT NULL,
        class TEXT NOT NULL,
        t TIMESTAMP NOT NULL,
        x REAL NOT NULL,
        y REAL NOT NULL,
        heading REAL,
        vest INTEGER,
        speed REAL,
        area TEXT,
        with_object BOOLEAN,
        PRIMARY KEY (id, t)
    )";

const CREATE_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_detections_t ON detections(t);
    CREATE INDEX IF NOT EXISTS idx_detections_class ON detections(class);
    CREATE INDEX IF NOT EXISTS idx_detections_area ON detections(area);
    CREATE INDEX IF NOT EXISTS idx_detections_id_t ON detections(id, t);
";

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        debug!("Opened SQLite store at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn concurrent_writers(&self) -> usize {
        1
    }

    fn enforces_natural_key(&self) -> bool {
        true
    }

    async fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(CREATE_TABLE, [])?;
        Ok(())
    }

    async fn create_indexes(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(CREATE_INDEXES)?;
        Ok(())
    }

    async fn drop_table(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DROP TABLE IF EXISTS detections", [])?;
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM detections", [])?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn insert_batch(&self, records: &[DetectionRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO detections
                     (id, class, t, x, y, heading, vest, speed, area, with_object)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for r in records {
                inserted += stmt.execute(params![
                    r.id,
                    r.class,
                    r.t,
                    r.x,
                    r.y,
                    r.heading,
                    r.vest,
                    r.speed,
                    r.area,
                    r.with_object,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        let distinct: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT class) FROM detections",
            [],
            |row| row.get(0),
        )?;
        let (min_t, max_t): (Option<DateTime<Utc>>, Option<DateTime<Utc>>) = conn.query_row(
            "SELECT MIN(t), MAX(t) FROM detections",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let mut stmt =
            conn.prepare("SELECT class, COUNT(*) FROM detections GROUP BY class ORDER BY class")?;
        let rows_per_class = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StoreStats {
            total_rows: total as u64,
            distinct_classes: distinct as u64,
            min_t,
            max_t,
            rows_per_class,
        })
    }
}
